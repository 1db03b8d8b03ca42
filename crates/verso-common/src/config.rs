use miette::Result;
use miette::miette;
use serde::{Deserialize, Serialize};

use std::future::Future;
use std::path::Path;
use std::path::PathBuf;

/// How inline wrappers of a line emptied by Backspace/Delete are restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetainStyleMode {
    /// Drop the cached wrappers.
    None,
    /// Re-apply once, then clear on the next press.
    #[default]
    Repeat,
    /// Always re-apply.
    Always,
}

/// Unit used by the character counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CharCounterType {
    #[default]
    Char,
    Byte,
    ByteHtml,
}

/// Tag-name patterns used to classify elements.
///
/// Each pattern is a `|`-separated list of uppercase tag names, as in `P|DIV|H[1-6]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatPatterns {
    pub line: String,
    pub br_line: String,
    pub closure_br_line: String,
    pub block: String,
    pub closure_block: String,
    pub text_style: String,
}

impl Default for FormatPatterns {
    fn default() -> Self {
        Self {
            line: "P|DIV|H[1-6]|LI|TH|TD|DETAILS".to_owned(),
            br_line: "PRE".to_owned(),
            closure_br_line: String::new(),
            block: "BLOCKQUOTE|OL|UL|FIGCAPTION|TABLE|THEAD|TBODY|TR|TH|TD|DETAILS".to_owned(),
            closure_block: "TH|TD".to_owned(),
            text_style:
                "strong|span|font|b|var|i|em|u|ins|s|strike|del|sub|sup|mark|a|label|code|summary"
                    .to_owned(),
        }
    }
}

/// Read-only inputs of the editing core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorOptions {
    /// Tag of the line created when no other line applies.
    pub default_line: String,
    /// Number of non-breaking spaces inserted by Tab.
    pub tab_size: usize,
    pub tab_disable: bool,
    pub max_char_count: Option<usize>,
    pub char_counter_type: CharCounterType,
    pub rtl: bool,
    pub retain_style_mode: RetainStyleMode,
    pub history_stack_delay_ms: u64,
    /// Maximum number of snapshots kept by the history stack.
    pub history_max_steps: usize,
    /// Attributes not copied to the line created by Enter.
    pub line_attr_reset: Vec<String>,
    pub read_only: bool,
    pub formats: FormatPatterns,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            default_line: "p".to_owned(),
            tab_size: 4,
            tab_disable: false,
            max_char_count: None,
            char_counter_type: CharCounterType::Char,
            rtl: false,
            retain_style_mode: RetainStyleMode::Repeat,
            history_stack_delay_ms: 400,
            history_max_steps: 100,
            line_attr_reset: vec!["id".to_owned()],
            read_only: false,
            formats: FormatPatterns::default(),
        }
    }
}

impl EditorOptions {
    /// Loads the options from the provided loader.
    pub async fn load(loader: &impl Loader) -> Result<Self> {
        loader
            .load()
            .await
            .map_err(|e| miette!("Failed to load editor options: {e}"))
    }

    /// Saves the options using the provided saver.
    pub async fn save(&self, saver: &impl Saver) -> Result<()> {
        saver
            .save(self)
            .await
            .map_err(|e| miette!("Failed to save editor options: {e}"))
    }
}

/// The trait for loading configuration data.
pub trait Loader {
    fn load(
        &self,
    ) -> impl Future<
        Output = core::result::Result<
            EditorOptions,
            Box<dyn std::error::Error + Send + Sync + 'static>,
        >,
    > + Send;
}

/// The trait for saving configuration data.
pub trait Saver {
    fn save(
        &self,
        config: &EditorOptions,
    ) -> impl Future<
        Output = core::result::Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>,
    > + Send;
}

/// An implementation of [`Loader`] and [`Saver`] that reads and writes an options file.
///
/// The format follows the file extension: `.json` or `.toml`.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Loader for FileStore {
    async fn load(
        &self,
    ) -> core::result::Result<EditorOptions, Box<dyn std::error::Error + Send + Sync + 'static>>
    {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&std::fs::read_to_string(&self.path)?)?),
            Some("toml") => Ok(toml::from_str(&std::fs::read_to_string(&self.path)?)?),
            _ => Err(miette!("Unsupported file format").into()),
        }
    }
}

impl Saver for FileStore {
    async fn save(
        &self,
        config: &EditorOptions,
    ) -> core::result::Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(std::fs::write(
                &self.path,
                serde_json::to_string_pretty(config)?,
            )?),
            Some("toml") => Ok(std::fs::write(&self.path, toml::to_string_pretty(config)?)?),
            _ => Err(miette!("Unsupported file format").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let opts: EditorOptions =
            serde_json::from_str(r#"{"tab_size": 2, "retain_style_mode": "always"}"#).unwrap();
        assert_eq!(opts.tab_size, 2);
        assert_eq!(opts.retain_style_mode, RetainStyleMode::Always);
        assert_eq!(opts.default_line, "p");
        assert_eq!(opts.formats, FormatPatterns::default());
    }

    #[test]
    fn counter_type_uses_kebab_case() {
        let opts: EditorOptions =
            toml::from_str("char_counter_type = \"byte-html\"\nmax_char_count = 10\n").unwrap();
        assert_eq!(opts.char_counter_type, CharCounterType::ByteHtml);
        assert_eq!(opts.max_char_count, Some(10));
    }

    #[test]
    fn default_options_snapshot() {
        insta::assert_yaml_snapshot!(EditorOptions::default(), @r#"
        default_line: p
        tab_size: 4
        tab_disable: false
        max_char_count: ~
        char_counter_type: char
        rtl: false
        retain_style_mode: repeat
        history_stack_delay_ms: 400
        history_max_steps: 100
        line_attr_reset:
          - id
        read_only: false
        formats:
          line: "P|DIV|H[1-6]|LI|TH|TD|DETAILS"
          br_line: PRE
          closure_br_line: ""
          block: BLOCKQUOTE|OL|UL|FIGCAPTION|TABLE|THEAD|TBODY|TR|TH|TD|DETAILS
          closure_block: TH|TD
          text_style: strong|span|font|b|var|i|em|u|ins|s|strike|del|sub|sup|mark|a|label|code|summary
        "#);
    }

    #[tokio::test]
    async fn file_store_round_trips_toml() {
        let path = std::env::temp_dir().join(format!("verso-opts-{}.toml", std::process::id()));
        let store = FileStore::new(&path);
        let opts = EditorOptions {
            tab_size: 8,
            rtl: true,
            ..Default::default()
        };
        opts.save(&store).await.unwrap();
        let loaded = EditorOptions::load(&store).await.unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, opts);
    }

    #[tokio::test]
    async fn unknown_extension_is_rejected() {
        let store = FileStore::new("options.yaml");
        assert!(EditorOptions::load(&store).await.is_err());
    }
}
