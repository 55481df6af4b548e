use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::warn;

use adega::config::{
    EngineConfig, DEFAULT_HEAP_SIZE, DEFAULT_INDEX_FRAMES, DEFAULT_MAX_KEYS_PER_NODE,
    DEFAULT_PAGE_FRAMES, DEFAULT_PAGE_SIZE,
};
use adega::interpreter::{self, SessionError};

#[derive(Parser, Debug)]
#[command(name = "adega")]
#[command(version)]
#[command(about = "Wine catalog database engine", long_about = None)]
struct Args {
    /// Source catalog CSV (vinho_id,rotulo,ano_colheita,tipo)
    #[arg(long, value_name = "PATH")]
    wine_data: PathBuf,

    /// Storage directory for the heap, metadata, and index files
    #[arg(long, value_name = "PATH", default_value = "./data")]
    storage_dir: PathBuf,

    /// Size of one data page in bytes
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PAGE_SIZE)]
    page_size_in_bytes: usize,

    /// Maximum keys per index node before a split; the command file
    /// header takes precedence when it names a different value
    #[arg(long, value_name = "M", default_value_t = DEFAULT_MAX_KEYS_PER_NODE)]
    max_keys_per_node: usize,

    /// Total size of the heap file in bytes
    #[arg(long, value_name = "N", default_value_t = DEFAULT_HEAP_SIZE)]
    heap_size_in_bytes: u64,

    /// Resident data page frames
    #[arg(long, value_name = "F", default_value_t = DEFAULT_PAGE_FRAMES)]
    amount_of_page_frames: usize,

    /// Resident index node frames
    #[arg(long, value_name = "F", default_value_t = DEFAULT_INDEX_FRAMES)]
    amount_of_index_frames: usize,

    /// Command file to execute
    #[arg(long, value_name = "PATH", default_value = "in.txt")]
    commands_file: PathBuf,

    /// Output file to write
    #[arg(long, value_name = "PATH", default_value = "out.txt")]
    out_file: PathBuf,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(err) = run(&args) {
        eprintln!("fatal: {}", err);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), SessionError> {
    let config = EngineConfig {
        storage_dir: args.storage_dir.clone(),
        page_size_in_bytes: args.page_size_in_bytes,
        heap_size_in_bytes: args.heap_size_in_bytes,
        amount_of_page_frames: args.amount_of_page_frames,
        amount_of_index_frames: args.amount_of_index_frames,
    };

    let text = std::fs::read_to_string(&args.commands_file)?;
    let script = interpreter::parse_script(&text)?;
    if script.max_keys != args.max_keys_per_node {
        warn!(
            "command header names {} keys per node, overriding --max-keys-per-node {}",
            script.max_keys, args.max_keys_per_node
        );
    }

    interpreter::run_session(&config, &args.wine_data, &args.commands_file, &args.out_file)
}
