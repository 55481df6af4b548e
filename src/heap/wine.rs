use super::error::{HeapError, HeapResult};

/// Wine variety stored in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WineKind {
    Red,
    White,
    Rose,
}

impl WineKind {
    /// Parse the `tipo` column of the source data
    pub fn from_tipo(tipo: &str) -> Option<Self> {
        match tipo.trim().to_lowercase().as_str() {
            "tinto" => Some(WineKind::Red),
            "branco" => Some(WineKind::White),
            "rose" | "rosé" => Some(WineKind::Rose),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            WineKind::Red => 1,
            WineKind::White => 2,
            WineKind::Rose => 3,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(WineKind::Red),
            2 => Some(WineKind::White),
            3 => Some(WineKind::Rose),
            _ => None,
        }
    }
}

/// A single wine record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WineRecord {
    pub wine_id: i32,
    pub label: String,
    pub harvest_year: i32,
    pub kind: WineKind,
}

/// Fixed part of a record frame: wine_id (4) + harvest_year (4) + kind (1) + label length (2)
const FRAME_HEADER_LEN: usize = 11;

impl WineRecord {
    /// Create a record, validating its invariants
    pub fn new(wine_id: i32, label: String, harvest_year: i32, kind: WineKind) -> HeapResult<Self> {
        if label.trim().is_empty() {
            return Err(HeapError::InvalidRecord(
                "label must not be empty or whitespace".to_string(),
            ));
        }
        if label.len() > u16::MAX as usize {
            return Err(HeapError::InvalidRecord(format!(
                "label is {} bytes, longest encodable label is {}",
                label.len(),
                u16::MAX
            )));
        }
        if harvest_year <= 0 {
            return Err(HeapError::InvalidRecord(format!(
                "harvest year must be positive, got {}",
                harvest_year
            )));
        }
        Ok(Self {
            wine_id,
            label,
            harvest_year,
            kind,
        })
    }

    /// Number of bytes this record occupies inside a page
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_LEN + self.label.len()
    }

    /// Append the record's frame to `buf`
    ///
    /// Layout (little-endian): wine_id i32, harvest_year i32, kind u8,
    /// label length u16, label bytes.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.wine_id.to_le_bytes());
        buf.extend_from_slice(&self.harvest_year.to_le_bytes());
        buf.push(self.kind.as_u8());
        buf.extend_from_slice(&(self.label.len() as u16).to_le_bytes());
        buf.extend_from_slice(self.label.as_bytes());
    }

    /// Decode one record frame from the front of `buf`, returning the
    /// record and the number of bytes consumed
    pub fn decode(buf: &[u8]) -> HeapResult<(Self, usize)> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(HeapError::InvalidRecord(format!(
                "record frame truncated: {} bytes left",
                buf.len()
            )));
        }

        let wine_id = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let harvest_year = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let kind = WineKind::from_u8(buf[8])
            .ok_or_else(|| HeapError::InvalidRecord(format!("unknown wine kind tag {}", buf[8])))?;
        let label_len = u16::from_le_bytes([buf[9], buf[10]]) as usize;

        let end = FRAME_HEADER_LEN + label_len;
        if buf.len() < end {
            return Err(HeapError::InvalidRecord(format!(
                "label truncated: need {} bytes, {} left",
                label_len,
                buf.len() - FRAME_HEADER_LEN
            )));
        }

        let label = std::str::from_utf8(&buf[FRAME_HEADER_LEN..end])
            .map_err(|e| HeapError::InvalidRecord(format!("label is not UTF-8: {}", e)))?
            .to_string();

        let record = WineRecord::new(wine_id, label, harvest_year, kind)?;
        Ok((record, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_tipo() {
        assert_eq!(WineKind::from_tipo("tinto"), Some(WineKind::Red));
        assert_eq!(WineKind::from_tipo("Branco"), Some(WineKind::White));
        assert_eq!(WineKind::from_tipo("rose"), Some(WineKind::Rose));
        assert_eq!(WineKind::from_tipo("rosé"), Some(WineKind::Rose));
        assert_eq!(WineKind::from_tipo(" TINTO "), Some(WineKind::Red));
        assert_eq!(WineKind::from_tipo("verde"), None);
    }

    #[test]
    fn test_kind_tag_round_trip() {
        for kind in [WineKind::Red, WineKind::White, WineKind::Rose] {
            assert_eq!(WineKind::from_u8(kind.as_u8()), Some(kind));
        }
        assert_eq!(WineKind::from_u8(0), None);
        assert_eq!(WineKind::from_u8(4), None);
    }

    #[test]
    fn test_new_validates_label() {
        assert!(WineRecord::new(1, "".to_string(), 2010, WineKind::Red).is_err());
        assert!(WineRecord::new(1, "   ".to_string(), 2010, WineKind::Red).is_err());
        assert!(WineRecord::new(1, "Quinta".to_string(), 2010, WineKind::Red).is_ok());
    }

    #[test]
    fn test_new_validates_year() {
        assert!(WineRecord::new(1, "Quinta".to_string(), 0, WineKind::Red).is_err());
        assert!(WineRecord::new(1, "Quinta".to_string(), -5, WineKind::Red).is_err());
        assert!(WineRecord::new(1, "Quinta".to_string(), 1, WineKind::Red).is_ok());
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let record =
            WineRecord::new(42, "Quinta do Vale 2010".to_string(), 2010, WineKind::Rose).unwrap();

        let mut buf = Vec::new();
        record.encode_into(&mut buf);
        assert_eq!(buf.len(), record.frame_len());

        let (decoded, consumed) = WineRecord::decode(&buf).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_decode_consumes_only_one_frame() {
        let first = WineRecord::new(1, "Primeiro".to_string(), 1999, WineKind::Red).unwrap();
        let second = WineRecord::new(2, "Segundo".to_string(), 2001, WineKind::White).unwrap();

        let mut buf = Vec::new();
        first.encode_into(&mut buf);
        second.encode_into(&mut buf);

        let (decoded_first, consumed) = WineRecord::decode(&buf).unwrap();
        assert_eq!(decoded_first, first);

        let (decoded_second, _) = WineRecord::decode(&buf[consumed..]).unwrap();
        assert_eq!(decoded_second, second);
    }

    #[test]
    fn test_decode_truncated() {
        let record = WineRecord::new(7, "Garrafeira".to_string(), 1985, WineKind::Red).unwrap();
        let mut buf = Vec::new();
        record.encode_into(&mut buf);

        assert!(WineRecord::decode(&buf[..5]).is_err());
        assert!(WineRecord::decode(&buf[..buf.len() - 1]).is_err());
    }

    #[test]
    fn test_decode_unknown_kind() {
        let record = WineRecord::new(7, "Garrafeira".to_string(), 1985, WineKind::Red).unwrap();
        let mut buf = Vec::new();
        record.encode_into(&mut buf);
        buf[8] = 9;
        assert!(WineRecord::decode(&buf).is_err());
    }
}
