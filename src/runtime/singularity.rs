//! # Singularity container runtime.
//!
//! Builds `singularity [global flags] <run|exec> [action flags] <image> [args..]`.
//! Image pulling, mounts and isolation are performed by singularity itself.

use serde::{Deserialize, Serialize};

use crate::core::DriverConfig;
use crate::runtime::{Capabilities, FsIsolation, Runtime};

/// Action used when the task config does not name one.
const DEFAULT_ACTION: &str = "run";

/// Driver config of one singularity task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SingularityConfig {
    /// Image reference (`library://`, `docker://`, or a local `.sif`).
    pub image: String,
    /// `run` or `exec`.
    pub command: Option<String>,
    /// Arguments appended after the image.
    pub args: Vec<String>,
    /// Global `-d`.
    pub debug: bool,
    /// Global `-v`.
    pub verbose: bool,
    /// Host paths bound in, `src[:dest[:opts]]`.
    #[serde(alias = "bind")]
    pub binds: Vec<String>,
    /// Overlay images.
    pub overlay: Vec<String>,
    /// Security options (`seccomp:..`, `uid:..`).
    pub security: Vec<String>,
    /// `--keep-privs`.
    pub keepprivs: bool,
    /// `--drop-caps`.
    pub dropcaps: Option<String>,
    /// `--contain`.
    pub contain: bool,
    /// `--no-home`.
    pub nohome: bool,
    /// `--home`.
    pub home: Option<String>,
    /// `--workdir`.
    pub workdir: Option<String>,
    /// `--pwd`.
    pub pwd: Option<String>,
    /// `--app`.
    pub app: Option<String>,
}

impl SingularityConfig {
    /// Returns the action, defaulting to `run`.
    pub fn action(&self) -> &str {
        self.command.as_deref().unwrap_or(DEFAULT_ACTION)
    }

    /// Flags between the action and the image.
    fn push_action_flags(&self, argv: &mut Vec<String>) {
        for bind in &self.binds {
            push_pair(argv, "--bind", bind);
        }
        for sec in &self.security {
            push_pair(argv, "--security", sec);
        }
        if self.keepprivs {
            argv.push("--keep-privs".into());
        }
        if let Some(caps) = non_empty(&self.dropcaps) {
            push_pair(argv, "--drop-caps", caps);
        }
        if self.contain {
            argv.push("--contain".into());
        }
        if self.nohome {
            argv.push("--no-home".into());
        }
        if let Some(home) = non_empty(&self.home) {
            push_pair(argv, "--home", home);
        }
        for fs in &self.overlay {
            push_pair(argv, "--overlay", fs);
        }
        if let Some(dir) = non_empty(&self.workdir) {
            push_pair(argv, "--workdir", dir);
        }
        if let Some(pwd) = non_empty(&self.pwd) {
            push_pair(argv, "--pwd", pwd);
        }
        if let Some(app) = non_empty(&self.app) {
            push_pair(argv, "--app", app);
        }
    }

    fn push_global_flags(&self, argv: &mut Vec<String>) {
        if self.debug {
            argv.push("-d".into());
        }
        if self.verbose {
            argv.push("-v".into());
        }
    }
}

fn push_pair(argv: &mut Vec<String>, flag: &str, value: &str) {
    argv.push(flag.to_string());
    argv.push(value.to_string());
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

/// Singularity runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct Singularity;

impl Runtime for Singularity {
    type Config = SingularityConfig;

    fn name(&self) -> &str {
        "singularity"
    }

    fn default_binary(&self) -> &str {
        "singularity"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            send_signals: true,
            exec: true,
            fs_isolation: FsIsolation::Chroot,
        }
    }

    fn build_argv(&self, config: &SingularityConfig) -> Vec<String> {
        let mut argv = Vec::with_capacity(16 + config.args.len());
        config.push_global_flags(&mut argv);
        argv.push(config.action().to_string());
        config.push_action_flags(&mut argv);
        argv.push(config.image.clone());
        argv.extend(config.args.iter().cloned());
        argv
    }

    fn validate(&self, config: &SingularityConfig, driver: &DriverConfig) -> Result<(), String> {
        if config.image.trim().is_empty() {
            return Err("image must be set".into());
        }
        match config.action() {
            "run" | "exec" => {}
            other => return Err(format!("command must be \"run\" or \"exec\", got {other:?}")),
        }
        if !config.binds.is_empty() && !driver.volumes_enabled {
            return Err("binds are not allowed while volumes are disabled".into());
        }
        Ok(())
    }

    fn exec_argv(&self, config: &SingularityConfig, cmd: &[String]) -> Option<Vec<String>> {
        let mut argv = Vec::with_capacity(8 + cmd.len());
        config.push_global_flags(&mut argv);
        argv.push("exec".into());
        config.push_action_flags(&mut argv);
        argv.push(config.image.clone());
        argv.extend(cmd.iter().cloned());
        Some(argv)
    }

    fn version_argv(&self) -> Vec<String> {
        vec!["version".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: serde_json::Value) -> SingularityConfig {
        serde_json::from_value(json).expect("valid config")
    }

    #[test]
    fn test_minimal_argv() {
        let cfg = config(serde_json::json!({ "image": "docker://alpine", "args": ["echo", "hi"] }));
        assert_eq!(
            Singularity.build_argv(&cfg),
            vec!["run", "docker://alpine", "echo", "hi"]
        );
    }

    #[test]
    fn test_full_argv_order() {
        let cfg = config(serde_json::json!({
            "image": "lolcow.sif",
            "command": "exec",
            "args": ["cowsay"],
            "debug": true,
            "verbose": true,
            "bind": ["/data:/mnt"],
            "security": ["uid:0"],
            "keepprivs": true,
            "dropcaps": "CAP_NET_RAW",
            "contain": true,
            "nohome": true,
            "home": "/home/u",
            "overlay": ["over.img"],
            "workdir": "/scratch",
            "pwd": "/work",
            "app": "cow",
        }));
        assert_eq!(
            Singularity.build_argv(&cfg),
            vec![
                "-d", "-v", "exec", "--bind", "/data:/mnt", "--security", "uid:0",
                "--keep-privs", "--drop-caps", "CAP_NET_RAW", "--contain", "--no-home",
                "--home", "/home/u", "--overlay", "over.img", "--workdir", "/scratch",
                "--pwd", "/work", "--app", "cow", "lolcow.sif", "cowsay",
            ]
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let res: Result<SingularityConfig, _> =
            serde_json::from_value(serde_json::json!({ "image": "a.sif", "gpu": true }));
        assert!(res.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_action_and_missing_image() {
        let driver = DriverConfig::default();
        let bad = config(serde_json::json!({ "image": "a.sif", "command": "shell" }));
        assert!(Singularity.validate(&bad, &driver).is_err());

        let empty = config(serde_json::json!({ "image": " " }));
        assert!(Singularity.validate(&empty, &driver).is_err());
    }

    #[test]
    fn test_binds_require_volumes() {
        let cfg = config(serde_json::json!({ "image": "a.sif", "binds": ["/a:/b"] }));
        let mut driver = DriverConfig::default();
        assert!(Singularity.validate(&cfg, &driver).is_ok());

        driver.volumes_enabled = false;
        assert!(Singularity.validate(&cfg, &driver).is_err());
    }

    #[test]
    fn test_exec_argv_keeps_binds() {
        let cfg = config(serde_json::json!({ "image": "a.sif", "binds": ["/a:/b"] }));
        let argv = Singularity
            .exec_argv(&cfg, &["ls".to_string(), "/b".to_string()])
            .expect("exec supported");
        assert_eq!(argv, vec!["exec", "--bind", "/a:/b", "a.sif", "ls", "/b"]);
    }
}
