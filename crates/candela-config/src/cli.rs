//! Command-line argument parsing for the Candela renderer.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Candela command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "candela", about = "Candela clustered-lighting renderer")]
pub struct CliArgs {
    /// Shadow atlas tile size in pixels.
    #[arg(long)]
    pub shadow_tile_size: Option<u32>,

    /// Number of tiles in the shadow atlas.
    #[arg(long)]
    pub shadow_tile_count: Option<u32>,

    /// Cascade split linearity (0 = logarithmic, 1 = linear).
    #[arg(long)]
    pub cascade_linearity: Option<f32>,

    /// Camera far clip distance.
    #[arg(long)]
    pub z_far: Option<f32>,

    /// Depth-cull lights during cluster assignment.
    #[arg(long)]
    pub z_cull_lights: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(size) = args.shadow_tile_size {
            self.shadow.tile_size = size;
        }
        if let Some(count) = args.shadow_tile_count {
            self.shadow.tile_count = count;
        }
        if let Some(linearity) = args.cascade_linearity {
            self.shadow.cascade_linearity = linearity;
        }
        if let Some(far) = args.z_far {
            self.camera.z_far = far;
        }
        if let Some(cull) = args.z_cull_lights {
            self.cluster.z_cull_lights = cull;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            shadow_tile_size: Some(1024),
            shadow_tile_count: None,
            cascade_linearity: None,
            z_far: Some(400.0),
            z_cull_lights: None,
            log_level: None,
            config: None,
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.shadow.tile_size, 1024);
        assert_eq!(config.camera.z_far, 400.0);
        // Non-overridden fields retain defaults
        assert_eq!(config.shadow.tile_count, 32);
        assert!(config.cluster.z_cull_lights);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        let args = CliArgs {
            shadow_tile_size: None,
            shadow_tile_count: None,
            cascade_linearity: None,
            z_far: None,
            z_cull_lights: None,
            log_level: None,
            config: None,
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config, original);
    }
}
