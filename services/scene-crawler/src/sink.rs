use std::{fs, io::{BufWriter, Write}, path::{Path, PathBuf}};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::info;

use crate::errors::CrawlerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    StudioHashes,
    StudioData,
    SceneHashes,
    SceneData
}

impl Snapshot {
    pub fn file_name(self) -> &'static str {
        match self {
            Snapshot::StudioHashes => "studio_hashes.json",
            Snapshot::StudioData   => "studio_data.json",
            Snapshot::SceneHashes  => "scene_hashes.json",
            Snapshot::SceneData    => "scene_data.json"
        }
    }
}

/// Writes pretty (4-space) json snapshots, replacing earlier runs atomically
pub struct JsonSink {
    root: PathBuf
}

impl JsonSink {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn path(&self, kind: Snapshot) -> PathBuf {
        self.root.join(kind.file_name())
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, kind: Snapshot, value: &T) ->
        Result<PathBuf, CrawlerError> {

        fs::create_dir_all(&self.root).map_err(|e|
            CrawlerError::Io(std::io::Error::new(
                e.kind(), format!("create dir {}: {e}", self.root.display())
            ))
        )?;
        let path = self.path(kind);

        let mut temp = tempfile::NamedTempFile::new_in(&self.root)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            let formatter = PrettyFormatter::with_indent(b"    ");
            let mut ser = Serializer::with_formatter(&mut writer, formatter);
            value.serialize(&mut ser)
                .map_err(|e| CrawlerError::Parse(format!("serialize json: {e}")))?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        temp.persist(&path).map_err(|e|
            CrawlerError::Io(std::io::Error::new(
                e.error.kind(), format!("persist {}: {}", path.display(), e.error)
            ))
        )?;

        info!(file = %path.display(), "sink.write");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SceneId, SceneRecord};
    use tempfile::tempdir;

    #[test]
    fn writes_four_space_indented_json() -> Result<(), CrawlerError> {
        let dir = tempdir()?;
        let sink = JsonSink::new(dir.path());
        let path = sink.write_json(Snapshot::StudioHashes, &vec!["a1", "b2"])?;

        assert_eq!(path, dir.path().join("studio_hashes.json"));
        let text = fs::read_to_string(&path)?;
        assert_eq!(text, "[\n    \"a1\",\n    \"b2\"\n]");
        Ok(())
    }

    #[test]
    fn pairs_are_written_as_arrays() -> Result<(), CrawlerError> {
        let dir = tempdir()?;
        let sink = JsonSink::new(dir.path());
        let rows = vec![(SceneId::from("s1"), SceneRecord::default())];
        let path = sink.write_json(Snapshot::SceneData, &rows)?;

        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(path)?)?;
        assert_eq!(v[0][0], "s1");
        assert_eq!(v[0][1]["markers"], serde_json::json!([]));
        Ok(())
    }

    #[test]
    fn object_keys_keep_remote_order() -> Result<(), CrawlerError> {
        let dir = tempdir()?;
        let sink = JsonSink::new(dir.path());
        let record: serde_json::Value =
            serde_json::from_str(r#"{"zeta": 1, "name": "Studio", "alpha": 2}"#)?;
        let path = sink.write_json(Snapshot::StudioData, &vec![("a1", record)])?;

        let text = fs::read_to_string(path)?;
        let (zeta, name, alpha) = (
            text.find("\"zeta\""), text.find("\"name\""), text.find("\"alpha\"")
        );
        assert!(zeta < name && name < alpha, "{text}");
        Ok(())
    }

    #[test]
    fn rewrites_overwrite_previous_output() -> Result<(), CrawlerError> {
        let dir = tempdir()?;
        let sink = JsonSink::new(dir.path());
        sink.write_json(Snapshot::SceneHashes, &vec!["old", "older", "oldest"])?;
        let path = sink.write_json(Snapshot::SceneHashes, &vec!["new"])?;

        let v: Vec<String> = serde_json::from_str(&fs::read_to_string(path)?)?;
        assert_eq!(v, vec!["new".to_string()]);
        Ok(())
    }
}
