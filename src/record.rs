use crate::common::RID;

const FIELD_SIZE: usize = 4;

/// A fixed-width record. `rid` is set once the record has a home on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub rid: Option<RID>,
    pub data: Box<[u8]>,
}

impl Record {
    pub fn new(rid: Option<RID>, data: &[u8]) -> Record {
        Record {
            rid,
            data: data.into(),
        }
    }

    /// Builds a record of little-endian `i32` fields.
    pub fn from_values(values: &[i32]) -> Record {
        let bytes = values
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect::<Vec<u8>>();
        Record::new(None, &bytes)
    }

    pub fn width_for_fields(field_count: usize) -> usize {
        field_count * FIELD_SIZE
    }

    pub fn values(&self) -> Vec<i32> {
        self.data
            .chunks_exact(FIELD_SIZE)
            .map(|chunk| {
                let mut bytes = [0u8; FIELD_SIZE];
                bytes.copy_from_slice(chunk);
                i32::from_le_bytes(bytes)
            })
            .collect()
    }

    pub fn width(&self) -> usize {
        self.data.len()
    }
}
