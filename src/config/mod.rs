use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::source::PaddingPolicy;
use crate::PipelineError;

const CONFIG_FILE_NAME: &str = "wotd.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Working files, exports and archive locations
    pub paths: PathsConfig,

    /// Bounded waits for every network/process boundary
    pub timeouts: TimeoutsConfig,

    /// Daily word acquisition
    pub source: SourceConfig,

    /// Generative text backend
    pub script: ScriptConfig,

    /// Text-to-speech backend
    pub audio: AudioConfig,

    /// Frame rendering or clip generation
    pub visual: VisualConfig,

    /// Final encode
    pub mux: MuxConfig,

    pub cleanup: CleanupConfig,

    pub approval: ApprovalConfig,

    /// Social platforms
    pub distribution: DistributionConfig,

    pub alerts: AlertConfig,

    /// Secrets, read from the environment only
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Base directory every relative path below is resolved against
    pub root: PathBuf,
    pub checkpoint: PathBuf,
    pub temp_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub export_file_name: String,
    pub archive_dir: PathBuf,
    pub handover_log: PathBuf,
    pub fallback_dataset: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            checkpoint: PathBuf::from("data_bridge.json"),
            temp_dir: PathBuf::from("temp"),
            exports_dir: PathBuf::from("exports"),
            export_file_name: "word_of_the_day.mp4".to_string(),
            archive_dir: PathBuf::from("permanent_archive"),
            handover_log: PathBuf::from("HANDOVER.md"),
            fallback_dataset: PathBuf::from("local_fallback.json"),
        }
    }
}

impl PathsConfig {
    /// Resolve a configured path against `root` unless it is already absolute
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.resolve(&self.checkpoint)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.resolve(&self.temp_dir)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.temp_dir().join("audio.mp3")
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.temp_dir().join("frames")
    }

    pub fn clip_path(&self) -> PathBuf {
        self.temp_dir().join("clip.mp4")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.resolve(&self.exports_dir)
    }

    pub fn export_path(&self) -> PathBuf {
        self.exports_dir().join(&self.export_file_name)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.resolve(&self.archive_dir)
    }

    pub fn handover_log(&self) -> PathBuf {
        self.resolve(&self.handover_log)
    }

    pub fn fallback_dataset(&self) -> PathBuf {
        self.resolve(&self.fallback_dataset)
    }
}

/// Timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub scrape_secs: u64,
    pub script_secs: u64,
    pub tts_secs: u64,
    pub render_secs: u64,
    pub encode_secs: u64,
    pub probe_secs: u64,
    pub upload_secs: u64,
    pub alert_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            scrape_secs: 30,
            script_secs: 60,
            tts_secs: 120,
            render_secs: 180,
            encode_secs: 120,
            probe_secs: 15,
            upload_secs: 120,
            alert_secs: 20,
        }
    }
}

impl TimeoutsConfig {
    pub fn scrape(&self) -> Duration {
        Duration::from_secs(self.scrape_secs)
    }

    pub fn script(&self) -> Duration {
        Duration::from_secs(self.script_secs)
    }

    pub fn tts(&self) -> Duration {
        Duration::from_secs(self.tts_secs)
    }

    pub fn render(&self) -> Duration {
        Duration::from_secs(self.render_secs)
    }

    pub fn encode(&self) -> Duration {
        Duration::from_secs(self.encode_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn upload(&self) -> Duration {
        Duration::from_secs(self.upload_secs)
    }

    pub fn alert(&self) -> Duration {
        Duration::from_secs(self.alert_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Page carrying today's word
    pub url: String,

    pub user_agent: String,

    /// How short definition lists are brought up to three entries
    pub padding: PaddingPolicy,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://www.dictionary.com/e/word-of-the-day/".to_string(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            padding: PaddingPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextBackendKind {
    /// Local `claude -p` process
    Cli,
    /// Messages HTTP API
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub backend: TextBackendKind,
    pub cli_program: String,
    pub model: String,
    pub api_url: String,
    pub max_tokens: u32,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            backend: TextBackendKind::Cli,
            cli_program: "claude".to_string(),
            model: "claude-haiku-4-5-20251001".to_string(),
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub api_url: String,
    pub voice_id: String,
    pub model_id: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.elevenlabs.io/v1".to_string(),
            voice_id: "onwK4e9ZLuTAKqWW03F9".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualStrategyKind {
    LocalRender,
    RemoteGeneration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub strategy: VisualStrategyKind,
    pub render: RenderConfig,
    pub remote: RemoteGenerationConfig,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            strategy: VisualStrategyKind::LocalRender,
            render: RenderConfig::default(),
            remote: RemoteGenerationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Renderer argv, run inside `working_dir`
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    /// Tree the renderer writes its PNG frames into
    pub output_dir: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            command: vec!["node".to_string(), "render.mjs".to_string()],
            working_dir: PathBuf::from("motion-canvas"),
            output_dir: PathBuf::from("motion-canvas/output"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteGenerationConfig {
    pub endpoint: String,
    /// JSON job body; string values may contain `{{prompt}}`
    pub job_template: PathBuf,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
}

impl Default for RemoteGenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8188".to_string(),
            job_template: PathBuf::from("templates/generation_job.json"),
            poll_interval_secs: 5,
            max_wait_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub frame_rate: u32,
    pub video_codec: String,
    pub video_bitrate: String,
    pub audio_bitrate: String,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            frame_rate: 30,
            video_codec: "libx264".to_string(),
            video_bitrate: "8000k".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Smallest export size that counts as a verified encode
    pub min_export_bytes: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            min_export_bytes: 1_048_576,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Viewer argv; the video path is appended. Platform opener when unset.
    pub viewer: Option<Vec<String>>,
}

impl ApprovalConfig {
    pub fn viewer_command(&self) -> Vec<String> {
        match &self.viewer {
            Some(argv) if !argv.is_empty() => argv.clone(),
            _ if cfg!(target_os = "macos") => vec!["open".to_string()],
            _ => vec!["xdg-open".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub hashtags: Vec<String>,
    pub tiktok: TikTokConfig,
    pub instagram: InstagramConfig,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            hashtags: vec![
                "#WordOfTheDay".to_string(),
                "#Vocabulary".to_string(),
                "#LearnEnglish".to_string(),
            ],
            tiktok: TikTokConfig::default(),
            instagram: InstagramConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TikTokConfig {
    pub enabled: bool,
    pub api_url: String,
    pub privacy_level: String,
}

impl Default for TikTokConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://open.tiktokapis.com".to_string(),
            privacy_level: "SELF_ONLY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    pub enabled: bool,
    pub graph_url: String,
    pub status_poll_secs: u64,
    pub status_max_wait_secs: u64,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            graph_url: "https://graph.facebook.com/v21.0".to_string(),
            status_poll_secs: 5,
            status_max_wait_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub smtp_host: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
        }
    }
}

/// Credentials supplied as environment-style key/value pairs
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub anthropic_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub generation_api_key: Option<String>,
    pub tiktok_access_token: Option<String>,
    pub instagram_user_id: Option<String>,
    pub instagram_access_token: Option<String>,
    pub email: Option<EmailCredentials>,
}

#[derive(Debug, Clone)]
pub struct EmailCredentials {
    pub user: String,
    pub password: String,
    pub recipient: String,
}

/// Empty values and template leftovers like `your_api_key_here` count as absent
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.starts_with("your_")
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !is_placeholder(v));

        let email = match (get("EMAIL_USER"), get("EMAIL_PASS"), get("RECIPIENT_EMAIL")) {
            (Some(user), Some(password), Some(recipient)) => Some(EmailCredentials {
                user,
                password,
                recipient,
            }),
            _ => None,
        };

        Self {
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            elevenlabs_api_key: get("ELEVENLABS_API_KEY"),
            generation_api_key: get("GENERATION_API_KEY"),
            tiktok_access_token: get("TIKTOK_ACCESS_TOKEN"),
            instagram_user_id: get("INSTAGRAM_USER_ID"),
            instagram_access_token: get("INSTAGRAM_ACCESS_TOKEN"),
            email,
        }
    }
}

impl Config {
    /// Load settings from `explicit`, `./wotd.yaml` or the user config dir, then credentials from
    /// the environment. A missing settings file means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::config_path(explicit)? {
            Some(path) => Self::from_file(&path)?,
            None => {
                tracing::debug!("No settings file found, using defaults");
                Self::default()
            }
        };

        config.credentials = Credentials::from_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current settings (never the credentials)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Settings file location, if one exists
    fn config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Some(path.to_path_buf()));
        }

        let local_config = PathBuf::from(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Ok(Some(local_config));
        }

        Ok(Self::user_config_path().filter(|p| p.exists()))
    }

    /// Default location written by `wotd config --init`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wotd-pipeline").join("config.yaml"))
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> {
            Err(PipelineError::Configuration(msg.to_string()).into())
        };

        if self.mux.frame_rate == 0 {
            return invalid("mux.frame_rate must be greater than zero");
        }

        let remote = &self.visual.remote;
        if remote.poll_interval_secs == 0 || remote.poll_interval_secs >= remote.max_wait_secs {
            return invalid("visual.remote.poll_interval_secs must be non-zero and below max_wait_secs");
        }

        if self.cleanup.min_export_bytes == 0 {
            return invalid("cleanup.min_export_bytes must be greater than zero");
        }

        if self.paths.fallback_dataset.as_os_str().is_empty() {
            return invalid("paths.fallback_dataset must be set");
        }

        if self.visual.render.command.is_empty() {
            return invalid("visual.render.command must name a program");
        }

        if let PaddingPolicy::Filler { template } = &self.source.padding {
            if !template.contains("{term}") {
                return invalid("source.padding.template must contain {term}");
            }
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        let set = |v: bool| if v { "set" } else { "missing" };

        println!("Current Configuration:");
        println!("  Root: {}", self.paths.root.display());
        println!("  Checkpoint: {}", self.paths.checkpoint_path().display());
        println!("  Export: {}", self.paths.export_path().display());
        println!("  Archive: {}", self.paths.archive_dir().display());
        println!("  Source: {}", self.source.url);
        println!("  Script backend: {:?} ({})", self.script.backend, self.script.model);
        println!("  Visual strategy: {:?}", self.visual.strategy);
        println!("  Encoder: {} @ {} fps", self.mux.video_codec, self.mux.frame_rate);
        println!("  Cleanup threshold: {} bytes", self.cleanup.min_export_bytes);
        println!("Credentials:");
        println!("  ANTHROPIC_API_KEY: {}", set(self.credentials.anthropic_api_key.is_some()));
        println!("  ELEVENLABS_API_KEY: {}", set(self.credentials.elevenlabs_api_key.is_some()));
        println!("  GENERATION_API_KEY: {}", set(self.credentials.generation_api_key.is_some()));
        println!("  TIKTOK_ACCESS_TOKEN: {}", set(self.credentials.tiktok_access_token.is_some()));
        println!(
            "  INSTAGRAM_USER_ID/ACCESS_TOKEN: {}",
            set(self.credentials.instagram_user_id.is_some()
                && self.credentials.instagram_access_token.is_some())
        );
        println!("  Alert email: {}", set(self.credentials.email.is_some()));
    }
}
