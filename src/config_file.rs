//! Generic config file loader: the file format is chosen by the file
//! name extension.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Serialize, de::DeserializeOwned};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigBackend {
    Json5,
    Yaml,
    Hcl,
}

impl ConfigBackend {
    pub fn from_str_config<T: DeserializeOwned>(self, s: &str) -> Result<T> {
        match self {
            ConfigBackend::Json5 => {
                serde_json5::from_str(s).with_context(|| anyhow!("decoding JSON5"))
            }
            ConfigBackend::Yaml => serde_yml::from_str(s).with_context(|| anyhow!("decoding YAML")),
            ConfigBackend::Hcl => hcl::from_str(s).with_context(|| anyhow!("decoding HCL")),
        }
    }

    pub fn to_string_config<T: Serialize>(self, value: &T) -> Result<String> {
        match self {
            // Plain JSON is valid JSON5
            ConfigBackend::Json5 => serde_json::to_string_pretty(value)
                .with_context(|| anyhow!("encoding config as JSON")),
            ConfigBackend::Yaml => {
                serde_yml::to_string(value).with_context(|| anyhow!("encoding config as YAML"))
            }
            ConfigBackend::Hcl => {
                hcl::to_string(value).with_context(|| anyhow!("encoding config as HCL"))
            }
        }
    }

    pub fn load_config_file<T: DeserializeOwned>(self, path: &Path) -> Result<T> {
        let s = std::fs::read_to_string(path)
            .with_context(|| anyhow!("loading config file from {path:?}"))?;
        self.from_str_config(&s)
            .with_context(|| anyhow!("config file {path:?}"))
    }
}

pub const FILE_EXTENSIONS: &[(&str, ConfigBackend)] = &[
    ("json5", ConfigBackend::Json5),
    ("json", ConfigBackend::Json5),
    ("yml", ConfigBackend::Yaml),
    ("yaml", ConfigBackend::Yaml),
    ("hcl", ConfigBackend::Hcl),
];

pub fn backend_from_path(path: &Path) -> Result<ConfigBackend> {
    let Some(ext) = path.extension() else {
        bail!(
            "given file path does not have an extension \
             for determining the file type: {path:?}"
        )
    };
    let Some(ext) = ext.to_str() else {
        bail!("given file path does have an extension that is not unicode: {path:?}")
    };
    if let Some((_, backend)) = FILE_EXTENSIONS.iter().find(|(e, _b)| *e == ext) {
        Ok(*backend)
    } else {
        bail!("given file path does have an unknown extension {ext:?}: {path:?}")
    }
}

fn with_extension_appended(path: &Path, extension: &str) -> Option<PathBuf> {
    let mut file_name = path.file_name()?.to_owned();
    file_name.push(".");
    file_name.push(extension);
    Some(path.with_file_name(file_name))
}

pub trait LoadConfigFile: DeserializeOwned {
    /// The extensions from `FILE_EXTENSIONS` will be appended (and
    /// tried in order)
    fn default_config_path_without_suffix() -> Result<Option<PathBuf>>;

    /// If `path` is given, the file must exist or an error is
    /// returned. Otherwise, a default location is checked
    /// (`default_config_path_without_suffix`) and if a file with one
    /// of the fitting file name extensions exists, it is loaded,
    /// otherwise `or_else` is called with a message mentioning what
    /// was tried; it can issue an error or generate a default config
    /// value.
    fn load_config<P: AsRef<Path>>(
        path: Option<P>,
        or_else: impl FnOnce(String) -> Result<Self>,
    ) -> Result<Self> {
        if let Some(path) = path {
            let path = path.as_ref();
            let backend = backend_from_path(path)?;
            return backend.load_config_file(path);
        }
        let Some(path) = Self::default_config_path_without_suffix()? else {
            return or_else(
                "no path was given and there is no default config location for this type"
                    .to_string(),
            );
        };
        let candidates: Vec<(PathBuf, ConfigBackend)> = FILE_EXTENSIONS
            .iter()
            .map(|(extension, backend)| {
                let path = with_extension_appended(&path, extension)
                    .ok_or_else(|| anyhow!("path is missing a file name: {path:?}"))?;
                Ok((path, *backend))
            })
            .collect::<Result<_>>()?;
        let existing: Vec<&(PathBuf, ConfigBackend)> =
            candidates.iter().filter(|(path, _)| path.exists()).collect();
        match existing.as_slice() {
            [] => {
                let tried: Vec<&PathBuf> = candidates.iter().map(|(path, _)| path).collect();
                or_else(format!("tried the default paths: {tried:?}"))
            }
            [(path, backend)] => backend.load_config_file(path),
            _ => {
                let paths: Vec<&PathBuf> = existing.iter().map(|(path, _)| path).collect();
                bail!("multiple config file paths found, leading to ambiguity: {paths:?}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_backend_from_path() -> Result<()> {
        assert_eq!(
            backend_from_path(Path::new("a/b.json5"))?,
            ConfigBackend::Json5
        );
        assert_eq!(backend_from_path(Path::new("b.yml"))?, ConfigBackend::Yaml);
        assert_eq!(backend_from_path(Path::new("b.hcl"))?, ConfigBackend::Hcl);
        assert!(backend_from_path(Path::new("b.toml")).is_err());
        assert!(backend_from_path(Path::new("noext")).is_err());
        Ok(())
    }

    #[test]
    fn t_with_extension_appended() {
        assert_eq!(
            with_extension_appended(Path::new("/home/u/.hwc-frames"), "yml"),
            Some(PathBuf::from("/home/u/.hwc-frames.yml"))
        );
        assert_eq!(with_extension_appended(Path::new("/"), "yml"), None);
    }
}
