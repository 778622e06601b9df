//! Tag gates for live input and buffering
//!
//! A gate rule asks an external tag predicate whether the owning actor carries
//! a tag. Evaluation fails open: no rules, gating disabled or no predicate
//! installed all mean "allowed".

use super::GameplayTag;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Tag-presence precondition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputGateRule {
    pub gate_tag: GameplayTag,
    /// `true`: tag must be present, `false`: tag must be absent
    pub require_present: bool,
    pub affects_buffering: bool,
    pub affects_live_input: bool,
}

impl Default for InputGateRule {
    fn default() -> Self {
        Self {
            gate_tag: GameplayTag::none(),
            require_present: true,
            affects_buffering: true,
            affects_live_input: true,
        }
    }
}

impl InputGateRule {
    pub fn require(tag: impl Into<GameplayTag>) -> Self {
        Self {
            gate_tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn forbid(tag: impl Into<GameplayTag>) -> Self {
        Self {
            gate_tag: tag.into(),
            require_present: false,
            ..Default::default()
        }
    }

    pub fn live_only(mut self) -> Self {
        self.affects_buffering = false;
        self.affects_live_input = true;
        self
    }

    pub fn buffering_only(mut self) -> Self {
        self.affects_buffering = true;
        self.affects_live_input = false;
        self
    }

    fn applies_to(&self, for_buffering: bool) -> bool {
        if for_buffering {
            self.affects_buffering
        } else {
            self.affects_live_input
        }
    }
}

/// Tag membership query of the owning actor
pub trait TagPredicate {
    fn actor_has_tag(&self, tag: &GameplayTag) -> bool;
}

impl<F> TagPredicate for F
where
    F: Fn(&GameplayTag) -> bool,
{
    fn actor_has_tag(&self, tag: &GameplayTag) -> bool {
        self(tag)
    }
}

/// Evaluates all rules relevant for live input (`for_buffering == false`) or buffering
pub fn evaluate_gates(
    enabled: bool,
    rules: &[InputGateRule],
    predicate: Option<&dyn TagPredicate>,
    for_buffering: bool,
) -> bool {
    if !enabled || rules.is_empty() {
        return true;
    }

    let Some(predicate) = predicate else {
        trace!("No tag predicate installed, gates pass");
        return true;
    };

    for rule in rules {
        if !rule.gate_tag.is_valid() || !rule.applies_to(for_buffering) {
            continue;
        }

        let has_tag = predicate.actor_has_tag(&rule.gate_tag);
        let passes = if rule.require_present { has_tag } else { !has_tag };
        if !passes {
            trace!(
                "Gate {} blocked {} input",
                rule.gate_tag,
                if for_buffering { "buffered" } else { "live" }
            );
            return false;
        }
    }

    true
}
