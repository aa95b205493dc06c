use serde::{Deserialize, Serialize};

/// Named byte blobs embedded in the document metadata itself.
///
/// Unlike layer images these never enter the trailing resource pool; the
/// metadata codec carries their data inline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStorage {
    pub resources: Vec<EmbeddedResource>,
}

impl ResourceStorage {
    /// Add a blob under a file name, deduplicating by name. Returns the
    /// handle of the new or existing entry.
    pub fn add_from_bytes(&mut self, file_name: impl Into<String>, data: Vec<u8>) -> i32 {
        let file_name = file_name.into();
        if let Some(existing) = self.resources.iter().find(|r| r.file_name == file_name) {
            return existing.handle;
        }
        let handle = self.resources.len() as i32;
        self.resources.push(EmbeddedResource {
            handle,
            file_name,
            data,
        });
        handle
    }

    pub fn get(&self, handle: i32) -> Option<&EmbeddedResource> {
        self.resources.iter().find(|r| r.handle == handle)
    }
}

/// One embedded resource: a handle, a file name, and the raw bytes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedResource {
    pub handle: i32,
    pub file_name: String,
    pub data: Vec<u8>,
}
