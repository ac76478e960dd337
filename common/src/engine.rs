use crate::{
    config::{BoostConfig, RuntimeConfig},
    policy::SpeedPolicy,
    types::{ControllerState, FanState, SpeedPercent},
};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    /// Kick-start pulse, held for `hold_ms` before the steady speed follows.
    Boost { speed: SpeedPercent, hold_ms: u64 },
    SetSpeed(SpeedPercent),
}

/// Stopped/Running state machine around [`SpeedPolicy`].
///
/// The engine only plans. The caller performs each action and reports back
/// through the `record_*` methods once it succeeded, so a failed output
/// never advances `last_speed`. A boost whose steady speed never landed
/// leaves the output dirty until `last_speed` is driven again.
#[derive(Debug, Clone)]
pub struct FanEngine {
    policy: SpeedPolicy,
    boost: BoostConfig,

    last_speed: SpeedPercent,
    boost_fired: bool,
    output_dirty: bool,
    persist_pending: bool,
}

impl FanEngine {
    pub fn new(policy: SpeedPolicy, boost: BoostConfig, restored: ControllerState) -> Self {
        Self {
            policy,
            boost,
            last_speed: restored.last_speed,
            boost_fired: false,
            output_dirty: false,
            persist_pending: false,
        }
    }

    pub fn from_config(config: &RuntimeConfig, restored: ControllerState) -> Self {
        Self::new(
            SpeedPolicy::new(config.curve.clone(), config.night.clone()),
            config.boost.clone(),
            restored,
        )
    }

    pub fn policy(&self) -> &SpeedPolicy {
        &self.policy
    }

    pub fn last_speed(&self) -> SpeedPercent {
        self.last_speed
    }

    pub fn state(&self) -> FanState {
        FanState::of(self.last_speed)
    }

    pub fn boost_fired(&self) -> bool {
        self.boost_fired
    }

    /// True while the output may hold something other than `last_speed`.
    pub fn output_dirty(&self) -> bool {
        self.output_dirty
    }

    pub fn controller_state(&self) -> ControllerState {
        ControllerState::new(self.last_speed)
    }

    pub fn target(&self, temp_c: f32, hour: u32) -> SpeedPercent {
        self.policy.final_speed(temp_c, self.last_speed, hour)
    }

    /// Actions for one poll. Empty when the target equals the last applied
    /// speed and the output is known to hold it.
    pub fn plan(&mut self, temp_c: f32, hour: u32) -> Vec<EngineAction> {
        let target = self.target(temp_c, hour);
        let mut actions = Vec::new();

        if target == self.last_speed {
            if self.last_speed.is_stopped() {
                // Still stopped: the next start gets its boost.
                self.boost_fired = false;
            }
            if self.output_dirty {
                actions.push(EngineAction::SetSpeed(target));
            }
            return actions;
        }

        // Only the Stopped -> Running edge boosts. A restart while spinning
        // restores a non-zero last_speed and never gets here.
        if self.last_speed.is_stopped() && !self.boost_fired {
            actions.push(EngineAction::Boost {
                speed: self.boost.speed(),
                hold_ms: self.boost.duration_ms,
            });
        }
        actions.push(EngineAction::SetSpeed(target));

        actions
    }

    pub fn record_boost(&mut self) {
        self.boost_fired = true;
        self.output_dirty = true;
    }

    /// Commits a speed the output stage accepted and returns the record to
    /// persist. Re-applying `last_speed` only cleans the output; the stored
    /// record is already current.
    pub fn record_applied(&mut self, speed: SpeedPercent) -> ControllerState {
        if speed != self.last_speed {
            self.last_speed = speed;
            self.persist_pending = true;
        }
        if speed.is_stopped() {
            self.boost_fired = false;
        }
        self.output_dirty = false;
        self.controller_state()
    }

    /// State still waiting for a successful store write.
    pub fn pending_state(&self) -> Option<ControllerState> {
        self.persist_pending.then(|| self.controller_state())
    }

    pub fn record_persisted(&mut self) {
        self.persist_pending = false;
    }
}
