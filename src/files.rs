use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    str::FromStr,
    sync::{Arc, RwLock},
    time::Instant,
};

/// Declared content category of an uploaded file. Drives the extraction
/// strategy and nothing else; the blob itself is stored verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Pdf,
    Word,
    Presentation,
    Spreadsheet,
    Csv,
    Archive,
    Audio,
    Video,
    Other,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Pdf => "pdf",
            FileCategory::Word => "word",
            FileCategory::Presentation => "presentation",
            FileCategory::Spreadsheet => "spreadsheet",
            FileCategory::Csv => "csv",
            FileCategory::Archive => "archive",
            FileCategory::Audio => "audio",
            FileCategory::Video => "video",
            FileCategory::Other => "other",
        }
    }

    /// Guess a category for an upload that didn't declare one: the file
    /// extension wins (it is an explicit signal from the uploader), then
    /// magic bytes, then `other`.
    pub fn sniff(name: &str, bytes: &[u8]) -> FileCategory {
        if let Some(category) = Self::from_extension(name) {
            return category;
        }

        if let Some(kind) = infer::get(bytes) {
            if let Some(category) = Self::from_mime(kind.mime_type()) {
                return category;
            }
        }

        FileCategory::Other
    }

    fn from_extension(name: &str) -> Option<FileCategory> {
        let ext = name.rsplit_once('.')?.1.to_lowercase();
        let category = match ext.as_str() {
            "pdf" => FileCategory::Pdf,
            "doc" | "docx" => FileCategory::Word,
            "ppt" | "pptx" => FileCategory::Presentation,
            "xls" | "xlsx" => FileCategory::Spreadsheet,
            "csv" => FileCategory::Csv,
            "zip" => FileCategory::Archive,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "svg" => FileCategory::Image,
            "mp3" | "wav" | "ogg" | "flac" | "m4a" => FileCategory::Audio,
            "mp4" | "mov" | "avi" | "mkv" | "webm" => FileCategory::Video,
            _ => return None,
        };
        Some(category)
    }

    fn from_mime(mime: &str) -> Option<FileCategory> {
        let category = match mime {
            "application/pdf" => FileCategory::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/msword" => FileCategory::Word,
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            | "application/vnd.ms-powerpoint" => FileCategory::Presentation,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-excel" => FileCategory::Spreadsheet,
            "application/zip" => FileCategory::Archive,
            m if m.starts_with("image/") => FileCategory::Image,
            m if m.starts_with("audio/") => FileCategory::Audio,
            m if m.starts_with("video/") => FileCategory::Video,
            _ => return None,
        };
        Some(category)
    }
}

impl Default for FileCategory {
    fn default() -> Self {
        FileCategory::Other
    }
}

impl FromStr for FileCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = match s.to_lowercase().as_str() {
            "image" => FileCategory::Image,
            "pdf" => FileCategory::Pdf,
            "word" => FileCategory::Word,
            "presentation" => FileCategory::Presentation,
            "spreadsheet" => FileCategory::Spreadsheet,
            "csv" => FileCategory::Csv,
            "archive" => FileCategory::Archive,
            "audio" => FileCategory::Audio,
            "video" => FileCategory::Video,
            "other" => FileCategory::Other,
            other => return Err(anyhow!("unknown file category: {other}")),
        };
        Ok(category)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: u64,

    pub name: String,
    pub category: FileCategory,
    pub org_id: String,
    pub user_id: String,

    /// Ident of the raw bytes in the blob store.
    pub blob_id: String,

    #[serde(default)]
    pub should_delete: bool,
    /// Epoch millis of the soft delete, set together with `should_delete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_on: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct FileCreate {
    pub name: String,
    pub category: FileCategory,
    pub org_id: String,
    pub user_id: String,
    pub blob_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileQuery {
    pub id: Option<u64>,
    /// Exact-match tenant scope. None means all tenants (maintenance only).
    pub org_id: Option<String>,
    /// Case-insensitive substring match on the display name.
    pub keyword: Option<String>,
    pub category: Option<FileCategory>,

    /// Only soft-deleted records (the trash view).
    #[serde(default)]
    pub deleted_only: bool,

    #[serde(default)]
    pub limit: Option<usize>,
}

pub trait FileManager: Send + Sync {
    fn create(&self, create: FileCreate) -> anyhow::Result<FileRecord>;
    fn get(&self, id: u64) -> anyhow::Result<Option<FileRecord>>;
    fn search(&self, query: FileQuery) -> anyhow::Result<Vec<FileRecord>>;
    fn soft_delete(&self, id: u64, when: i64) -> anyhow::Result<FileRecord>;
    fn restore(&self, id: u64) -> anyhow::Result<FileRecord>;
    fn delete(&self, id: u64) -> anyhow::Result<()>;
    fn total(&self) -> anyhow::Result<usize>;
}

/// CSV-backed record store. The whole table is held in memory and
/// rewritten atomically on every mutation.
#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<FileRecord>>>,
    path: String,
}

const CSV_HEADERS: [&str; 8] = [
    "id",
    "name",
    "category",
    "org_id",
    "user_id",
    "blob_id",
    "should_delete",
    "deleted_on",
];

impl BackendCsv {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new file database at {path}");
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;
        let iter = csv_reader.records();

        let mut records = vec![];
        for record in iter {
            let record = record?;
            let id = record
                .get(0)
                .ok_or(anyhow!("couldnt get record id"))?
                .parse::<u64>()?;
            let name = record
                .get(1)
                .ok_or(anyhow!("couldnt get record name"))?
                .to_string();
            let category = record
                .get(2)
                .ok_or(anyhow!("couldnt get record category"))?
                .parse::<FileCategory>()
                .unwrap_or(FileCategory::Other);
            let org_id = record
                .get(3)
                .ok_or(anyhow!("couldnt get record org_id"))?
                .to_string();
            let user_id = record
                .get(4)
                .ok_or(anyhow!("couldnt get record user_id"))?
                .to_string();
            let blob_id = record
                .get(5)
                .ok_or(anyhow!("couldnt get record blob_id"))?
                .to_string();
            let should_delete = record
                .get(6)
                .ok_or(anyhow!("couldnt get record should_delete"))?
                == "1";
            let deleted_on = record
                .get(7)
                .ok_or(anyhow!("couldnt get record deleted_on"))?
                .parse::<i64>()
                .ok();

            records.push(FileRecord {
                id,
                name,
                category,
                org_id,
                user_id,
                blob_id,
                should_delete,
                deleted_on,
            });
        }

        log::debug!(
            "took {}ms to read csv",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        let mgr = BackendCsv {
            list: Arc::new(RwLock::new(records)),
            path: path.to_string(),
        };

        Ok(mgr)
    }

    pub fn save(&self) {
        let records = self.list.write().unwrap();

        let temp_path = format!("{}-tmp", &self.path);
        let mut csv_wrt = csv::Writer::from_path(&temp_path).unwrap();
        csv_wrt.write_record(CSV_HEADERS).unwrap();
        for record in records.iter() {
            csv_wrt
                .write_record([
                    &record.id.to_string(),
                    &record.name,
                    &record.category.as_str().to_string(),
                    &record.org_id,
                    &record.user_id,
                    &record.blob_id,
                    &(if record.should_delete { "1" } else { "" }).to_string(),
                    &record
                        .deleted_on
                        .map(|ms| ms.to_string())
                        .unwrap_or_default(),
                ])
                .unwrap();
        }
        csv_wrt.flush().unwrap();
        std::fs::rename(&temp_path, &self.path).unwrap();
    }
}

impl FileManager for BackendCsv {
    fn create(&self, create: FileCreate) -> anyhow::Result<FileRecord> {
        let id = if let Some(last) = self.list.write().unwrap().last() {
            last.id + 1
        } else {
            0
        };

        let record = FileRecord {
            id,
            name: create.name,
            category: create.category,
            org_id: create.org_id,
            user_id: create.user_id,
            blob_id: create.blob_id,
            should_delete: false,
            deleted_on: None,
        };

        self.list.write().unwrap().push(record.clone());

        self.save();

        Ok(record)
    }

    fn get(&self, id: u64) -> anyhow::Result<Option<FileRecord>> {
        let records = self.list.read().unwrap();
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    fn soft_delete(&self, id: u64, when: i64) -> anyhow::Result<FileRecord> {
        self.mark_deleted(id, true, Some(when))
    }

    fn restore(&self, id: u64) -> anyhow::Result<FileRecord> {
        self.mark_deleted(id, false, None)
    }

    fn delete(&self, id: u64) -> anyhow::Result<()> {
        let mut records = self.list.write().unwrap();
        let result = records.iter().position(|r| r.id == id).map(|idx| {
            records.remove(idx);
        });

        drop(records);

        if result.is_some() {
            self.save();
        }

        Ok(())
    }

    fn total(&self) -> anyhow::Result<usize> {
        Ok(self.list.read().unwrap().len())
    }

    fn search(&self, query: FileQuery) -> anyhow::Result<Vec<FileRecord>> {
        let records = self.list.read().unwrap();

        let keyword = query.keyword.as_ref().map(|k| k.to_lowercase());

        let mut output = vec![];

        for record in records.iter() {
            if let Some(id) = query.id {
                if record.id != id {
                    continue;
                }
            }

            if let Some(org_id) = &query.org_id {
                // tenant scope is exact equality, never containment
                if &record.org_id != org_id {
                    continue;
                }
            }

            if query.deleted_only != record.should_delete {
                continue;
            }

            if let Some(category) = query.category {
                if record.category != category {
                    continue;
                }
            }

            if let Some(keyword) = &keyword {
                if !record.name.to_lowercase().contains(keyword) {
                    continue;
                }
            }

            output.push(record.clone());

            let id_query = query.id.is_some();
            let limit_reached =
                query.limit.is_some() && output.len() >= query.limit.unwrap_or_default();

            if id_query || limit_reached {
                break;
            }
        }

        Ok(output)
    }
}

impl BackendCsv {
    fn mark_deleted(
        &self,
        id: u64,
        should_delete: bool,
        deleted_on: Option<i64>,
    ) -> anyhow::Result<FileRecord> {
        let mut records = self.list.write().unwrap();

        let idx = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| anyhow!("file with id {} not found", id))?;

        let record = &mut records[idx];
        record.should_delete = should_delete;
        record.deleted_on = deleted_on;

        let result = record.clone();
        drop(records);

        self.save();

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mgr() -> (BackendCsv, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("files.csv");
        let mgr = BackendCsv::load(path.to_str().unwrap()).unwrap();
        (mgr, tmp)
    }

    fn create(name: &str, org: &str) -> FileCreate {
        FileCreate {
            name: name.to_string(),
            category: FileCategory::Other,
            org_id: org.to_string(),
            user_id: "u1".to_string(),
            blob_id: format!("blob-{name}"),
        }
    }

    #[test]
    fn create_assigns_sequential_ids() {
        let (mgr, _tmp) = mgr();
        let a = mgr.create(create("a", "org1")).unwrap();
        let b = mgr.create(create("b", "org1")).unwrap();
        assert_eq!(a.id, 0);
        assert_eq!(b.id, 1);
        assert_eq!(mgr.total().unwrap(), 2);
    }

    #[test]
    fn search_is_org_exact_match() {
        let (mgr, _tmp) = mgr();
        mgr.create(create("a", "org1")).unwrap();
        mgr.create(create("b", "org12")).unwrap();

        let found = mgr
            .search(FileQuery {
                org_id: Some("org1".to_string()),
                ..Default::default()
            })
            .unwrap();

        // "org12" must not leak into "org1" even though it contains it
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "a");
    }

    #[test]
    fn search_by_keyword_is_case_insensitive() {
        let (mgr, _tmp) = mgr();
        mgr.create(create("Quarterly Report.pdf", "org1")).unwrap();
        mgr.create(create("notes.txt", "org1")).unwrap();

        let found = mgr
            .search(FileQuery {
                keyword: Some("REPORT".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn soft_delete_hides_from_default_listing() {
        let (mgr, _tmp) = mgr();
        let record = mgr.create(create("a", "org1")).unwrap();
        mgr.soft_delete(record.id, 12345).unwrap();

        let active = mgr.search(FileQuery::default()).unwrap();
        assert!(active.is_empty());

        let trash = mgr
            .search(FileQuery {
                deleted_only: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].deleted_on, Some(12345));

        mgr.restore(record.id).unwrap();
        let active = mgr.search(FileQuery::default()).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].deleted_on, None);
    }

    #[test]
    fn records_survive_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("files.csv");
        let path = path.to_str().unwrap();

        {
            let mgr = BackendCsv::load(path).unwrap();
            let mut c = create("report.pdf", "org1");
            c.category = FileCategory::Pdf;
            mgr.create(c).unwrap();
        }

        let mgr = BackendCsv::load(path).unwrap();
        let record = mgr.get(0).unwrap().unwrap();
        assert_eq!(record.name, "report.pdf");
        assert_eq!(record.category, FileCategory::Pdf);
        assert!(!record.should_delete);
    }

    #[test]
    fn sniff_prefers_extension() {
        assert_eq!(
            FileCategory::sniff("report.docx", b"PK\x03\x04"),
            FileCategory::Word
        );
        assert_eq!(
            FileCategory::sniff("deck.pptx", b"PK\x03\x04"),
            FileCategory::Presentation
        );
        assert_eq!(FileCategory::sniff("data.csv", b"a,b,c"), FileCategory::Csv);
    }

    #[test]
    fn sniff_falls_back_to_magic_bytes() {
        assert_eq!(
            FileCategory::sniff("invoice", b"%PDF-1.4 something"),
            FileCategory::Pdf
        );
        let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];
        assert_eq!(FileCategory::sniff("picture", &png), FileCategory::Image);
    }

    #[test]
    fn sniff_unknown_is_other() {
        assert_eq!(FileCategory::sniff("notes", b"plain text"), FileCategory::Other);
    }

    #[test]
    fn category_parse_roundtrip() {
        for category in [
            FileCategory::Image,
            FileCategory::Pdf,
            FileCategory::Word,
            FileCategory::Presentation,
            FileCategory::Spreadsheet,
            FileCategory::Csv,
            FileCategory::Archive,
            FileCategory::Audio,
            FileCategory::Video,
            FileCategory::Other,
        ] {
            assert_eq!(category.as_str().parse::<FileCategory>().unwrap(), category);
        }
        assert!("floppy".parse::<FileCategory>().is_err());
    }
}
