//! Configuration manager.

use log::error;

use crate::error::ConfigError;
use crate::model::Config;
use crate::runtime::RuntimeCfg;
use crate::validate::validate;

/// Owns the active configuration and its derived routing.
///
/// All mutation funnels through [`stage`](Self::stage) and
/// [`commit`](Self::commit): callers edit the staging copy, and commit
/// validates it, derives a fresh [`RuntimeCfg`] and swaps both in as a
/// unit. A failing commit drops the staged edits and leaves the active
/// pair untouched, so readers never observe a half-applied change.
pub struct ConfigManager {
    active: Config,
    staging: Config,
    runtime: RuntimeCfg,
    dirty: bool,
}

impl ConfigManager {
    /// Validate `config` and make it active.
    pub fn new(mut config: Config) -> Result<Self, ConfigError> {
        validate(&mut config)?;
        let runtime = RuntimeCfg::derive(&config);
        config.fmopl_sidno = runtime.fmopl_sid;
        Ok(Self {
            active: config,
            staging: config,
            runtime,
            dirty: false,
        })
    }

    /// Boot helper: fall back to compiled defaults when the stored
    /// config cannot be salvaged.
    pub fn new_or_default(config: Config) -> Self {
        match Self::new(config) {
            Ok(manager) => manager,
            Err(err) => {
                error!("stored config rejected ({err}), using compiled defaults");
                let mut fallback = Config::default();
                // Compiled defaults always pass validation.
                validate(&mut fallback).ok();
                let runtime = RuntimeCfg::derive(&fallback);
                Self {
                    active: fallback,
                    staging: fallback,
                    runtime,
                    dirty: false,
                }
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.active
    }

    pub fn runtime(&self) -> &RuntimeCfg {
        &self.runtime
    }

    /// Start or continue an edit on the staging copy.
    pub fn stage(&mut self) -> &mut Config {
        if !self.dirty {
            self.staging = self.active;
            self.dirty = true;
        }
        &mut self.staging
    }

    /// Validate the staged edits and swap them in.
    pub fn commit(&mut self) -> Result<(), ConfigError> {
        let mut candidate = self.staging;
        match validate(&mut candidate) {
            Ok(()) => {
                self.runtime = RuntimeCfg::derive(&candidate);
                // The FMopl chip number follows routing, not the editor.
                candidate.fmopl_sidno = self.runtime.fmopl_sid;
                self.active = candidate;
                self.staging = candidate;
                self.dirty = false;
                Ok(())
            }
            Err(err) => {
                self.staging = self.active;
                self.dirty = false;
                Err(err)
            }
        }
    }

    /// Throw away staged edits.
    pub fn revert(&mut self) {
        self.staging = self.active;
        self.dirty = false;
    }

    /// Replace the whole configuration in one commit, e.g. from a
    /// WriteConfig blob or a detection result.
    pub fn install(&mut self, config: Config) -> Result<(), ConfigError> {
        *self.stage() = config;
        self.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_with_defaults_routes_two_sids() {
        let manager = ConfigManager::new(Config::default()).expect("defaults validate");
        assert_eq!(manager.runtime().numsids, 2);
        assert_eq!(manager.config().socket_two.sid1.addr, 0x20);
    }

    #[test]
    fn commit_swaps_config_and_runtime_together() {
        let mut manager = ConfigManager::new(Config::default()).expect("defaults validate");
        manager.stage().socket_two.enabled = false;
        assert_eq!(manager.runtime().numsids, 2, "no change before commit");
        manager.commit().expect("edit validates");
        assert_eq!(manager.runtime().numsids, 1);
        assert!(!manager.config().socket_two.enabled);
    }

    #[test]
    fn failing_commit_leaves_active_state_untouched() {
        let mut manager = ConfigManager::new(Config::default()).expect("defaults validate");
        manager.stage().socket_one.enabled = false;
        manager.stage().socket_two.enabled = false;
        assert_eq!(manager.commit(), Err(ConfigError::BothSocketsDisabled));
        assert!(manager.config().socket_one.enabled);
        assert_eq!(manager.runtime().numsids, 2);
        // Staged edits are gone after the failure.
        assert!(manager.stage().socket_one.enabled);
    }

    #[test]
    fn consecutive_stages_accumulate_until_commit() {
        let mut manager = ConfigManager::new(Config::default()).expect("defaults validate");
        manager.stage().mirrored = true;
        manager.stage().rgb.brightness = 0x10;
        manager.commit().expect("edit validates");
        assert!(manager.config().mirrored);
        assert_eq!(manager.config().rgb.brightness, 0x10);
    }

    #[test]
    fn revert_discards_staged_edits() {
        let mut manager = ConfigManager::new(Config::default()).expect("defaults validate");
        manager.stage().mirrored = true;
        manager.revert();
        manager.commit().expect("clean commit");
        assert!(!manager.config().mirrored);
    }

    #[test]
    fn install_replaces_the_whole_config() {
        let mut manager = ConfigManager::new(Config::default()).expect("defaults validate");
        manager.stage().rgb.brightness = 0x10;
        let mut incoming = Config::default();
        incoming.socket_one.dualsid = true;
        incoming.socket_one.chiptype = crate::model::ChipType::Clone;
        manager.install(incoming).expect("incoming validates");
        assert_eq!(manager.runtime().numsids, 3);
        assert_eq!(manager.config().rgb.brightness, 0x7F, "staged edit dropped");
    }

    #[test]
    fn unsalvageable_config_falls_back_to_defaults() {
        let mut broken = Config::default();
        broken.socket_one.enabled = false;
        broken.socket_two.enabled = false;
        let manager = ConfigManager::new_or_default(broken);
        assert_eq!(manager.runtime().numsids, 2);
    }
}
