use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use regex::Regex;

use super::error::{IndexError, IndexResult};
use super::node::{BPlusNode, InternalNode, LeafNode, NodeId};
use super::IndexKey;
use crate::heap::Locator;

/// Tree metadata kept at the head of the index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexMetadata {
    pub root_id: NodeId,
    pub next_node_id: NodeId,
    pub height: u64,
}

/// Pattern of one node record line
const NODE_RECORD_PATTERN: &str =
    r"^NODE (\d+) \| LEAF=(true|false) \| KEYS=([0-9,\-]*) \| (CHILDREN|VALUES)=([0-9,:\-]*)( \| NEXT=(\d+|null))?$";

/// Owns the index file: persists individually addressable B+ tree nodes
/// and the tree metadata
///
/// Layout: a text metadata block (`ROOT_ID=`, `NEXT_ID=`, `HEIGHT=`,
/// blank separator) followed by one `NODE ...` record line per node.
/// Node lookup is a line scan and node rewrite is a read-modify-write of
/// the file text; the decoded-node working set above this store is
/// bounded by the frame pool, not here.
pub struct IndexFileStore {
    path: PathBuf,
    file: File,
    metadata: IndexMetadata,
    node_re: Regex,
}

impl IndexFileStore {
    /// Open the index file, creating it with an empty root leaf (id 0)
    /// when absent
    pub fn open(path: &Path) -> IndexResult<Self> {
        let node_re = Regex::new(NODE_RECORD_PATTERN)
            .map_err(|e| IndexError::IndexInit(format!("node pattern invalid: {}", e)))?;

        if path.exists() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| {
                    IndexError::IndexInit(format!(
                        "cannot open index file {}: {}",
                        path.display(),
                        e
                    ))
                })?;

            let mut store = Self {
                path: path.to_path_buf(),
                file,
                metadata: IndexMetadata {
                    root_id: 0,
                    next_node_id: 1,
                    height: 0,
                },
                node_re,
            };
            store.metadata = store.read_metadata()?;
            debug!(
                "opened index file {} (root {}, height {})",
                store.path.display(),
                store.metadata.root_id,
                store.metadata.height
            );
            return Ok(store);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                IndexError::IndexInit(format!(
                    "cannot create index file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let metadata = IndexMetadata {
            root_id: 0,
            next_node_id: 1,
            height: 0,
        };
        let mut store = Self {
            path: path.to_path_buf(),
            file,
            metadata,
            node_re,
        };

        let root = BPlusNode::Leaf(LeafNode::new(0));
        let text = format!("{}{}\n", store.metadata_block(), encode_node(&root));
        store
            .write_text(&text)
            .map_err(|e| IndexError::IndexInit(format!("cannot write initial index: {}", e)))?;

        info!("initialized index file {}", store.path.display());
        Ok(store)
    }

    /// Current root node id
    pub fn root_id(&self) -> NodeId {
        self.metadata.root_id
    }

    /// Cached tree height; no I/O
    pub fn height(&self) -> u64 {
        self.metadata.height
    }

    /// Next node id to be assigned
    pub fn next_node_id(&self) -> NodeId {
        self.metadata.next_node_id
    }

    /// Whether `id` has been assigned to a node
    pub fn node_exists(&self, id: NodeId) -> bool {
        id < self.metadata.next_node_id
    }

    /// Assign a fresh node id and persist the metadata block
    pub fn allocate_node_id(&mut self) -> IndexResult<NodeId> {
        let id = self.metadata.next_node_id;
        self.metadata.next_node_id += 1;
        self.save_metadata()?;
        Ok(id)
    }

    /// Point the tree at a new root and record the new height
    pub fn set_root(&mut self, root_id: NodeId, height: u64) -> IndexResult<()> {
        self.metadata.root_id = root_id;
        self.metadata.height = height;
        self.save_metadata()
    }

    /// Scan the file for the record of node `id` and decode it
    pub fn load_node(&mut self, id: NodeId) -> IndexResult<BPlusNode> {
        self.file.seek(SeekFrom::Start(0))?;
        let reader = BufReader::new(&mut self.file);
        let prefix = format!("NODE {} ", id);

        for line in reader.lines() {
            let line = line?;
            if line.starts_with(&prefix) {
                return decode_node(&self.node_re, &line);
            }
        }
        Err(IndexError::NodeNotFound(id))
    }

    /// Rewrite the node's record in place, appending it when new
    pub fn save_node(&mut self, node: &BPlusNode) -> IndexResult<()> {
        let text = self.read_text()?;
        let prefix = format!("NODE {} ", node.id());
        let record = encode_node(node);

        let mut replaced = false;
        let mut out = String::with_capacity(text.len() + record.len() + 1);
        for line in text.lines() {
            if line.starts_with(&prefix) {
                out.push_str(&record);
                replaced = true;
            } else {
                out.push_str(line);
            }
            out.push('\n');
        }
        if !replaced {
            out.push_str(&record);
            out.push('\n');
        }

        self.write_text(&out)
    }

    /// Rewrite the metadata block, preserving every node record
    pub fn save_metadata(&mut self) -> IndexResult<()> {
        let text = self.read_text()?;
        let records = match text.split_once("\n\n") {
            Some((_, rest)) => rest,
            None => "",
        };

        let mut out = self.metadata_block();
        out.push_str(records);
        self.write_text(&out)
    }

    /// Force written bytes to stable storage
    pub fn flush(&mut self) -> IndexResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn metadata_block(&self) -> String {
        format!(
            "ROOT_ID={}\nNEXT_ID={}\nHEIGHT={}\n\n",
            self.metadata.root_id, self.metadata.next_node_id, self.metadata.height
        )
    }

    fn read_metadata(&mut self) -> IndexResult<IndexMetadata> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);

        let root_id = read_metadata_field(&mut reader, "ROOT_ID")?;
        let next_node_id = read_metadata_field(&mut reader, "NEXT_ID")?;
        let height = read_metadata_field(&mut reader, "HEIGHT")?;

        Ok(IndexMetadata {
            root_id,
            next_node_id,
            height,
        })
    }

    fn read_text(&mut self) -> IndexResult<String> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut text = String::new();
        self.file.read_to_string(&mut text)?;
        Ok(text)
    }

    fn write_text(&mut self, text: &str) -> IndexResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(text.as_bytes())?;
        self.file.set_len(text.len() as u64)?;
        Ok(())
    }
}

fn read_metadata_field<R: BufRead>(reader: &mut R, field: &str) -> IndexResult<u64> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let value = line
        .trim_end()
        .strip_prefix(field)
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or_else(|| {
            IndexError::CorruptRecord(format!("expected {}= line, got {:?}", field, line.trim_end()))
        })?;
    value
        .parse::<u64>()
        .map_err(|e| IndexError::CorruptRecord(format!("{} value invalid: {}", field, e)))
}

fn encode_node(node: &BPlusNode) -> String {
    match node {
        BPlusNode::Leaf(leaf) => {
            let next = match leaf.next_leaf {
                Some(id) => id.to_string(),
                None => "null".to_string(),
            };
            format!(
                "NODE {} | LEAF=true | KEYS={} | VALUES={} | NEXT={}",
                leaf.id,
                join_keys(&leaf.keys),
                join_locators(&leaf.locators),
                next
            )
        }
        BPlusNode::Internal(internal) => format!(
            "NODE {} | LEAF=false | KEYS={} | CHILDREN={}",
            internal.id,
            join_keys(&internal.keys),
            join_children(&internal.children)
        ),
    }
}

fn decode_node(node_re: &Regex, line: &str) -> IndexResult<BPlusNode> {
    let caps = node_re
        .captures(line)
        .ok_or_else(|| IndexError::CorruptRecord(format!("unparseable node record: {}", line)))?;

    let id: NodeId = caps[1]
        .parse()
        .map_err(|e| IndexError::CorruptRecord(format!("node id invalid: {}", e)))?;
    let is_leaf = &caps[2] == "true";
    let keys = parse_keys(&caps[3])?;
    let list_tag = &caps[4];
    let list = &caps[5];

    if is_leaf {
        if list_tag != "VALUES" {
            return Err(IndexError::CorruptRecord(format!(
                "leaf {} carries {} instead of VALUES",
                id, list_tag
            )));
        }
        let locators = parse_locators(list)?;
        if locators.len() != keys.len() {
            return Err(IndexError::CorruptRecord(format!(
                "leaf {} has {} keys but {} values",
                id,
                keys.len(),
                locators.len()
            )));
        }
        let next_leaf = match caps.get(7).map(|m| m.as_str()) {
            Some("null") | None => None,
            Some(raw) => Some(raw.parse::<NodeId>().map_err(|e| {
                IndexError::CorruptRecord(format!("leaf {} next pointer invalid: {}", id, e))
            })?),
        };
        let mut leaf = LeafNode::with_entries(id, keys, locators);
        leaf.next_leaf = next_leaf;
        Ok(BPlusNode::Leaf(leaf))
    } else {
        if list_tag != "CHILDREN" {
            return Err(IndexError::CorruptRecord(format!(
                "internal node {} carries {} instead of CHILDREN",
                id, list_tag
            )));
        }
        let children = parse_children(list)?;
        if children.len() != keys.len() + 1 {
            return Err(IndexError::CorruptRecord(format!(
                "internal node {} has {} keys but {} children",
                id,
                keys.len(),
                children.len()
            )));
        }
        Ok(BPlusNode::Internal(InternalNode::new(id, keys, children)))
    }
}

fn join_keys(keys: &[IndexKey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn join_children(children: &[NodeId]) -> String {
    children
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn join_locators(locators: &[Locator]) -> String {
    locators
        .iter()
        .map(|l| format!("{}:{}", l.page_id, l.slot))
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_keys(csv: &str) -> IndexResult<Vec<IndexKey>> {
    if csv.is_empty() {
        return Ok(Vec::new());
    }
    csv.split(',')
        .map(|raw| {
            raw.parse::<IndexKey>()
                .map_err(|e| IndexError::CorruptRecord(format!("key {:?} invalid: {}", raw, e)))
        })
        .collect()
}

fn parse_children(csv: &str) -> IndexResult<Vec<NodeId>> {
    if csv.is_empty() {
        return Ok(Vec::new());
    }
    csv.split(',')
        .map(|raw| {
            raw.parse::<NodeId>()
                .map_err(|e| IndexError::CorruptRecord(format!("child {:?} invalid: {}", raw, e)))
        })
        .collect()
}

fn parse_locators(csv: &str) -> IndexResult<Vec<Locator>> {
    if csv.is_empty() {
        return Ok(Vec::new());
    }
    csv.split(',')
        .map(|raw| {
            let (page, slot) = raw.split_once(':').ok_or_else(|| {
                IndexError::CorruptRecord(format!("locator {:?} is not page:slot", raw))
            })?;
            let page_id = page.parse::<u64>().map_err(|e| {
                IndexError::CorruptRecord(format!("locator page {:?} invalid: {}", page, e))
            })?;
            let slot = slot.parse::<usize>().map_err(|e| {
                IndexError::CorruptRecord(format!("locator slot {:?} invalid: {}", slot, e))
            })?;
            Ok(Locator::new(page_id, slot))
        })
        .collect()
}

impl crate::buffer::BackingStore for IndexFileStore {
    type Entity = BPlusNode;
    type Error = IndexError;

    fn entity_id(node: &BPlusNode) -> u64 {
        node.id()
    }

    fn contains(&self, id: u64) -> bool {
        self.node_exists(id)
    }

    fn fetch(&mut self, id: u64) -> IndexResult<BPlusNode> {
        self.load_node(id)
    }

    fn persist(&mut self, node: &BPlusNode) -> IndexResult<()> {
        self.save_node(node)
    }

    fn first_id(&self) -> Option<u64> {
        Some(self.metadata.root_id)
    }

    fn sync(&mut self) -> IndexResult<()> {
        self.flush()
    }
}
