use crate::config::{Config, TextBackendKind, VisualStrategyKind};

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format, keeping tenths under a minute
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.1}s", seconds);
    }

    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else {
        format!("{}m {}s", minutes, secs)
    }
}

/// External tools the configured run depends on that are not on PATH
pub async fn check_dependencies(config: &Config) -> Vec<String> {
    let mut required = vec![
        (config.mux.ffmpeg.clone(), "required to encode the final video"),
        (config.mux.ffprobe.clone(), "recommended to verify the output duration"),
    ];

    if config.visual.strategy == VisualStrategyKind::LocalRender {
        if let Some(program) = config.visual.render.command.first() {
            required.push((program.clone(), "required by the local renderer"));
        }
    }

    if config.script.backend == TextBackendKind::Cli {
        required.push((config.script.cli_program.clone(), "required by the cli script backend"));
    }

    let mut missing = Vec::new();
    for (command, why) in required {
        if !check_command_available(&command).await {
            missing.push(format!("{} - {}", command, why));
        }
    }
    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(14.016), "14.0s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[tokio::test]
    async fn test_missing_tools_are_reported() {
        let mut config = Config::default();
        config.mux.ffmpeg = "definitely-not-ffmpeg-wotd".to_string();
        config.mux.ffprobe = "true".to_string();
        config.visual.strategy = VisualStrategyKind::RemoteGeneration;
        config.script.backend = TextBackendKind::Api;

        let missing = check_dependencies(&config).await;
        assert_eq!(missing.len(), 1);
        assert!(missing[0].starts_with("definitely-not-ffmpeg-wotd"));
    }
}
