use std::io::Read;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::pluginlib::{
    BuildFilePlugin, BuildPlugin, DatasourceType, EmbeddableChunk, PluginError, parse_context,
    to_context_value,
};

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];
const DEFAULT_MAX_TOKENS: usize = 300;
const DEFAULT_TOKENS_OVERLAP: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileChunk {
    pub chunk_index: usize,
    pub chunk_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContext {
    pub file_name: String,
    pub chunks: Vec<FileChunk>,
}

/// Chunks plain-text files into overlapping word windows.
pub struct UnstructuredFilesPlugin {
    max_tokens: usize,
    tokens_overlap: usize,
}

impl Default for UnstructuredFilesPlugin {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            tokens_overlap: DEFAULT_TOKENS_OVERLAP,
        }
    }
}

impl UnstructuredFilesPlugin {
    fn chunk_file(&self, file_content: &str) -> Vec<FileChunk> {
        let words = file_content.split_whitespace().collect::<Vec<&str>>();
        if words.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = usize::min(words.len(), start + self.max_tokens);
            chunks.push(FileChunk {
                chunk_index: start,
                chunk_content: words[start..end].join(" "),
            });
            start = if end < words.len() {
                end - self.tokens_overlap
            } else {
                words.len()
            };
        }

        chunks
    }
}

impl BuildPlugin for UnstructuredFilesPlugin {
    fn id(&self) -> &'static str {
        "dce/files"
    }

    fn name(&self) -> &'static str {
        "Unstructured Files Plugin"
    }

    fn supported_types(&self) -> Vec<DatasourceType> {
        SUPPORTED_EXTENSIONS
            .iter()
            .map(|extension| DatasourceType::new(format!("files/{extension}")))
            .collect()
    }

    fn divide_context_into_chunks(
        &self,
        context: &Value,
    ) -> Result<Vec<EmbeddableChunk>, PluginError> {
        let context: FileContext = parse_context(context)?;

        context
            .chunks
            .into_iter()
            .map(|file_chunk| {
                Ok(EmbeddableChunk {
                    embeddable_text: file_chunk.chunk_content.clone(),
                    content: to_context_value(&file_chunk)?,
                })
            })
            .collect()
    }
}

impl BuildFilePlugin for UnstructuredFilesPlugin {
    fn build_file_context(
        &self,
        _full_type: &str,
        file_name: &str,
        reader: &mut dyn Read,
    ) -> Result<Value, PluginError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| PluginError::Execution(format!("failed to read {file_name}: {e}")))?;
        let file_content = String::from_utf8_lossy(&bytes);

        to_context_value(&FileContext {
            file_name: file_name.to_string(),
            chunks: self.chunk_file(&file_content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_for(content: &str) -> Value {
        let plugin = UnstructuredFilesPlugin::default();
        let mut reader = content.as_bytes();
        plugin
            .build_file_context("files/md", "note.md", &mut reader)
            .unwrap()
    }

    #[test]
    fn short_file_becomes_one_chunk() {
        let plugin = UnstructuredFilesPlugin::default();
        let chunks = plugin
            .divide_context_into_chunks(&context_for("# Hello\nworld"))
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].embeddable_text, "# Hello world");
    }

    #[test]
    fn long_file_chunks_overlap() {
        let words = (0..700).map(|i| format!("w{i}")).collect::<Vec<String>>();
        let content = words.join(" ");
        let plugin = UnstructuredFilesPlugin::default();

        let context: FileContext = serde_yaml::from_value(context_for(&content)).unwrap();
        assert_eq!(context.chunks.len(), 3);
        assert_eq!(context.chunks[0].chunk_index, 0);
        assert_eq!(context.chunks[1].chunk_index, 250);
        assert_eq!(context.chunks[2].chunk_index, 500);

        // The tail of one window reappears at the head of the next.
        assert!(context.chunks[0].chunk_content.ends_with("w299"));
        assert!(context.chunks[1].chunk_content.starts_with("w250"));
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let plugin = UnstructuredFilesPlugin::default();
        let chunks = plugin
            .divide_context_into_chunks(&context_for("   \n\t "))
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn supports_txt_and_md() {
        let plugin = UnstructuredFilesPlugin::default();
        let types = plugin
            .supported_types()
            .into_iter()
            .map(|t| t.full_type)
            .collect::<Vec<String>>();
        assert_eq!(types, vec!["files/txt", "files/md"]);
    }
}
