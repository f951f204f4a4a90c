//! Library definitions.
//!
//! A [`LibraryDefinition`] mirrors the `library.json` descriptor that ships in
//! every library folder of an uploaded package. Storage only cares about its
//! identity (machine name plus major/minor version) and where the unpacked
//! upload currently lives; the remaining fields are carried so callers can
//! deserialize the descriptor once and hand the same value to storage.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Descriptor of a versioned library bundle.
///
/// See <https://h5p.org/library-definition> for the meaning of each field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LibraryDefinition {
    pub title: String,
    pub description: String,
    pub machine_name: String,
    /// Legacy descriptors use `name` instead of `machineName`.
    pub name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,
    pub author: String,
    pub license: String,
    #[serde(deserialize_with = "flag")]
    pub runnable: bool,
    pub embed_types: Vec<String>,
    #[serde(deserialize_with = "flag")]
    pub fullscreen: bool,
    pub core_api: Option<CoreApi>,
    pub preloaded_js: Vec<PreloadedFile>,
    pub preloaded_css: Vec<PreloadedFile>,
    pub preloaded_dependencies: Vec<Dependency>,
    /// Where the unpacked upload currently resides. Set by the caller before
    /// handing the definition to [`save_library`](crate::StorageStrategy::save_library),
    /// never persisted.
    #[serde(skip)]
    pub upload_directory: PathBuf,
}
impl LibraryDefinition {
    /// Falls back to `name` when `machine_name` is empty.
    pub fn machine_name(&self) -> &str {
        match self.machine_name.is_empty() {
            true => &self.name,
            false => &self.machine_name,
        }
    }

    /// Renders `"<machineName> <major>.<minor>"`, or with `compact` set,
    /// `"<machineName>-<major>.<minor>"` which is the on-disk directory name.
    pub fn as_string(&self, compact: bool) -> String {
        let separator = if compact { '-' } else { ' ' };
        format!("{}{separator}{}.{}", self.machine_name(), self.major_version, self.minor_version)
    }

    /// Where the library sits inside its upload directory.
    pub fn upload_path(&self) -> PathBuf {
        self.upload_directory.join(self.as_string(true))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreApi {
    pub major_version: u32,
    pub minor_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreloadedFile {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
}

/// Descriptors in the wild use both `1`/`0` and `true`/`false` for flags.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(u64),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn renders_identity() {
        let library = LibraryDefinition {
            machine_name: "MyLib".into(),
            major_version: 1,
            minor_version: 0,
            patch_version: 3,
            ..Default::default()
        };
        assert_eq!(library.as_string(false), "MyLib 1.0");
        assert_eq!(library.as_string(true), "MyLib-1.0");
    }

    #[test]
    fn falls_back_to_name() {
        let library = LibraryDefinition {
            name: "mylib".into(),
            major_version: 2,
            minor_version: 5,
            ..Default::default()
        };
        assert_eq!(library.as_string(true), "mylib-2.5");
    }

    #[test]
    fn upload_path_appends_directory_name() {
        let library = LibraryDefinition {
            machine_name: "MyLib".into(),
            major_version: 1,
            upload_directory: PathBuf::from("/tmp/upload"),
            ..Default::default()
        };
        assert_eq!(library.upload_path(), Path::new("/tmp/upload/MyLib-1.0"));
    }

    #[test]
    fn deserializes_library_json() {
        let json = r#"{
            "title": "Multiple Choice",
            "machineName": "H5P.MultiChoice",
            "majorVersion": 1,
            "minorVersion": 16,
            "patchVersion": 4,
            "runnable": 1,
            "fullscreen": false,
            "embedTypes": ["iframe"],
            "coreApi": { "majorVersion": 1, "minorVersion": 24 },
            "preloadedJs": [{ "path": "js/multichoice.js" }],
            "preloadedCss": [{ "path": "css/multichoice.css" }],
            "preloadedDependencies": [
                { "machineName": "H5P.Question", "majorVersion": 1, "minorVersion": 5 }
            ]
        }"#;
        let library: LibraryDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(library.as_string(true), "H5P.MultiChoice-1.16");
        assert!(library.runnable);
        assert!(!library.fullscreen);
        assert_eq!(library.preloaded_js[0].path, "js/multichoice.js");
        assert_eq!(library.preloaded_dependencies[0].machine_name, "H5P.Question");
        assert_eq!(library.core_api, Some(CoreApi { major_version: 1, minor_version: 24 }));
        assert!(library.upload_directory.as_os_str().is_empty());
    }
}
