use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::action::DrawingAction;

pub type MessageId = u64;
pub type FolderId = u64;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    pub id: FolderId,
    pub name: String,
    pub parent_id: Option<FolderId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    Text {
        content: String,
    },
    Image {
        #[serde(rename = "imageData")]
        image_data: String,
        #[serde(rename = "drawingActions", default)]
        drawing_actions: Vec<DrawingAction>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[serde(default)]
    pub id: MessageId,
    pub folder_id: FolderId,
    #[serde(flatten)]
    pub body: MessageBody,
    pub timestamp: i64,
}

/// Persistence collaborator for note messages. The editor session only ever
/// reads a record at open and writes once at save; hosts may plug in their
/// own backend.
pub trait MessageStore {
    /// Assigns the record a fresh id and returns it.
    fn add_message(&mut self, record: MessageRecord) -> Result<MessageId>;
    fn update_message(&mut self, record: &MessageRecord) -> Result<()>;
    fn delete_message(&mut self, id: MessageId) -> Result<()>;
    fn get_message(&self, id: MessageId) -> Result<Option<MessageRecord>>;
    /// Messages of one folder, oldest first.
    fn messages_in_folder(&self, folder_id: FolderId) -> Result<Vec<MessageRecord>>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
struct Database {
    folders: Vec<FolderRecord>,
    messages: Vec<MessageRecord>,
    next_folder_id: FolderId,
    next_message_id: MessageId,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            messages: Vec::new(),
            next_folder_id: 1,
            next_message_id: 1,
        }
    }
}

impl Database {
    fn add_folder(&mut self, name: &str, parent_id: Option<FolderId>) -> FolderId {
        let id = self.next_folder_id;
        self.next_folder_id = self.next_folder_id.saturating_add(1);
        self.folders.push(FolderRecord {
            id,
            name: name.to_string(),
            parent_id,
        });
        id
    }

    fn get_folder(&self, id: FolderId) -> Option<&FolderRecord> {
        self.folders.iter().find(|folder| folder.id == id)
    }

    fn folders_under(&self, parent_id: Option<FolderId>) -> Vec<FolderRecord> {
        self.folders
            .iter()
            .filter(|folder| folder.parent_id == parent_id)
            .cloned()
            .collect()
    }

    fn rename_folder(&mut self, id: FolderId, name: &str) -> Result<()> {
        let folder = self
            .folders
            .iter_mut()
            .find(|folder| folder.id == id)
            .ok_or_else(|| anyhow!("folder {id} is missing"))?;
        folder.name = name.to_string();
        Ok(())
    }

    fn delete_messages_of_folder(&mut self, folder_id: FolderId) {
        self.messages.retain(|message| message.folder_id != folder_id);
    }

    /// A second-level folder takes its messages with it; a top-level folder
    /// additionally takes every folder nested under it.
    fn delete_folder(&mut self, id: FolderId) -> Result<()> {
        let folder = self
            .get_folder(id)
            .cloned()
            .ok_or_else(|| anyhow!("folder {id} is missing"))?;
        if folder.parent_id.is_some() {
            self.delete_messages_of_folder(id);
        } else {
            for sub in self.folders_under(Some(id)) {
                self.delete_messages_of_folder(sub.id);
                self.folders.retain(|folder| folder.id != sub.id);
            }
        }
        self.folders.retain(|folder| folder.id != id);
        Ok(())
    }

    fn add_message(&mut self, mut record: MessageRecord) -> MessageId {
        let id = self.next_message_id;
        self.next_message_id = self.next_message_id.saturating_add(1);
        record.id = id;
        self.messages.push(record);
        id
    }

    fn update_message(&mut self, record: &MessageRecord) -> Result<()> {
        let slot = self
            .messages
            .iter_mut()
            .find(|message| message.id == record.id)
            .ok_or_else(|| anyhow!("message {} is missing", record.id))?;
        *slot = record.clone();
        Ok(())
    }

    fn delete_message(&mut self, id: MessageId) {
        self.messages.retain(|message| message.id != id);
    }

    fn get_message(&self, id: MessageId) -> Option<MessageRecord> {
        self.messages.iter().find(|message| message.id == id).cloned()
    }

    fn messages_in_folder(&self, folder_id: FolderId) -> Vec<MessageRecord> {
        let mut messages: Vec<MessageRecord> = self
            .messages
            .iter()
            .filter(|message| message.folder_id == folder_id)
            .cloned()
            .collect();
        messages.sort_by_key(|message| message.timestamp);
        messages
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    db: Database,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&mut self, name: &str, parent_id: Option<FolderId>) -> FolderId {
        self.db.add_folder(name, parent_id)
    }

    pub fn get_folder(&self, id: FolderId) -> Option<&FolderRecord> {
        self.db.get_folder(id)
    }

    pub fn folders_under(&self, parent_id: Option<FolderId>) -> Vec<FolderRecord> {
        self.db.folders_under(parent_id)
    }

    pub fn rename_folder(&mut self, id: FolderId, name: &str) -> Result<()> {
        self.db.rename_folder(id, name)
    }

    pub fn delete_folder(&mut self, id: FolderId) -> Result<()> {
        self.db.delete_folder(id)
    }
}

impl MessageStore for MemoryStore {
    fn add_message(&mut self, record: MessageRecord) -> Result<MessageId> {
        Ok(self.db.add_message(record))
    }

    fn update_message(&mut self, record: &MessageRecord) -> Result<()> {
        self.db.update_message(record)
    }

    fn delete_message(&mut self, id: MessageId) -> Result<()> {
        self.db.delete_message(id);
        Ok(())
    }

    fn get_message(&self, id: MessageId) -> Result<Option<MessageRecord>> {
        Ok(self.db.get_message(id))
    }

    fn messages_in_folder(&self, folder_id: FolderId) -> Result<Vec<MessageRecord>> {
        Ok(self.db.messages_in_folder(folder_id))
    }
}

/// File-backed store: the whole database is one pretty-printed JSON document
/// rewritten after every mutation.
#[derive(Clone, Debug)]
pub struct JsonStore {
    db: Database,
    path: PathBuf,
}

impl JsonStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let db = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("corrupt note store at {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Database::default(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("cannot read note store at {}", path.display()));
            }
        };
        Ok(Self { db, path })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "notemark", "notemark")
            .context("cannot resolve note store path")?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("cannot create {}", data_dir.display()))?;
        Self::open(data_dir.join("notes.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.db)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("cannot write note store at {}", self.path.display()))?;
        Ok(())
    }

    pub fn add_folder(&mut self, name: &str, parent_id: Option<FolderId>) -> Result<FolderId> {
        let id = self.db.add_folder(name, parent_id);
        self.persist()?;
        Ok(id)
    }

    pub fn get_folder(&self, id: FolderId) -> Option<&FolderRecord> {
        self.db.get_folder(id)
    }

    pub fn folders_under(&self, parent_id: Option<FolderId>) -> Vec<FolderRecord> {
        self.db.folders_under(parent_id)
    }

    pub fn rename_folder(&mut self, id: FolderId, name: &str) -> Result<()> {
        self.db.rename_folder(id, name)?;
        self.persist()
    }

    pub fn delete_folder(&mut self, id: FolderId) -> Result<()> {
        self.db.delete_folder(id)?;
        self.persist()
    }
}

impl MessageStore for JsonStore {
    fn add_message(&mut self, record: MessageRecord) -> Result<MessageId> {
        let id = self.db.add_message(record);
        self.persist()?;
        Ok(id)
    }

    fn update_message(&mut self, record: &MessageRecord) -> Result<()> {
        self.db.update_message(record)?;
        self.persist()
    }

    fn delete_message(&mut self, id: MessageId) -> Result<()> {
        self.db.delete_message(id);
        self.persist()
    }

    fn get_message(&self, id: MessageId) -> Result<Option<MessageRecord>> {
        Ok(self.db.get_message(id))
    }

    fn messages_in_folder(&self, folder_id: FolderId) -> Result<Vec<MessageRecord>> {
        Ok(self.db.messages_in_folder(folder_id))
    }
}
