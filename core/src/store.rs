//! File-backed persistence for the draft and its story context. The editor
//! saves the draft after every mutation; a crash never loses more than the
//! current keystroke.

use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use tokio::fs;

use crate::config::Config;
use crate::context::StoryContext;
use crate::error::Result;

pub const DRAFT_FILE: &str = "draft.md";
pub const STORY_TOML_FILE: &str = "story.toml";

/// On-disk shape of story.toml: the planning-stage context plus the
/// author's preferred continuation length.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct StoryToml {
    #[serde(flatten)]
    context: StoryContext,
    prediction_length: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct DraftStore {
    quill_home: PathBuf,
    draft_path: PathBuf,
}

impl DraftStore {
    pub fn new(config: &Config) -> Self {
        let draft_path = config
            .draft_path
            .clone()
            .unwrap_or_else(|| config.quill_home.join(DRAFT_FILE));
        Self {
            quill_home: config.quill_home.clone(),
            draft_path,
        }
    }

    pub fn draft_path(&self) -> &Path {
        &self.draft_path
    }

    pub async fn load_draft(&self) -> Result<Option<String>> {
        read_optional(&self.draft_path).await
    }

    pub async fn save_draft(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.draft_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.draft_path, text).await?;
        Ok(())
    }

    /// Returns the persisted story context and, when present, the saved
    /// prediction length. Absent file means defaults.
    pub async fn load_story(&self) -> Result<(StoryContext, Option<u16>)> {
        let path = self.quill_home.join(STORY_TOML_FILE);
        match read_optional(&path).await? {
            Some(contents) => {
                let story: StoryToml = toml::from_str(&contents)?;
                Ok((story.context, story.prediction_length))
            }
            None => Ok((StoryContext::default(), None)),
        }
    }

    pub async fn save_story(&self, context: &StoryContext, prediction_length: u16) -> Result<()> {
        fs::create_dir_all(&self.quill_home).await?;
        let story = StoryToml {
            context: context.clone(),
            prediction_length: Some(prediction_length),
        };
        let contents = toml::to_string_pretty(&story)?;
        fs::write(self.quill_home.join(STORY_TOML_FILE), contents).await?;
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}
