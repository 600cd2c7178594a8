//! Access decisions over a compiled policy

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::{common_key, subject_key, CacheStats, EvaluationCache};
use super::value::truthy;
use super::vector::LazyVector;
use crate::bitmask::{BitCoord, Bitmask};
use crate::config::EvaluatorConfig;
use crate::error::{PolicyError, Result};
use crate::model::AccessMode;
use crate::policy::{CompiledPolicy, CompiledSubject};

/// Who is asking, under which roles, about which subject instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Acting user's data
    pub user: Value,

    /// Request environment data
    #[serde(default)]
    pub environment: Value,

    /// Active role names
    #[serde(default)]
    pub roles: Vec<String>,

    /// Subject name
    pub subject: String,

    /// Subject instance data
    pub instance: Value,
}

impl AccessRequest {
    pub fn new(user: Value, subject: impl Into<String>, instance: Value) -> Self {
        Self {
            user,
            environment: Value::Null,
            roles: Vec::new(),
            subject: subject.into(),
            instance,
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_environment(mut self, environment: Value) -> Self {
        self.environment = environment;
        self
    }
}

/// A rule whose condition held for the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub role: String,
    /// Position within the role's rules for the subject
    pub rule_index: usize,
    pub mode: AccessMode,
}

/// How the decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// No rule matched
    NoMatchingRule,
    /// A matched forbid rule covers the action
    Forbidden,
    /// Rules matched but none allows the action
    NotGranted,
    Allowed,
}

/// Outcome of [`AccessEvaluator::decide`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub subject: String,
    pub action: String,
    pub matched: Vec<MatchedRule>,
    pub resolution: Resolution,
}

/// Allow and forbid masks merged over every matched rule
struct MergedMasks {
    allow: Bitmask,
    forbid: Bitmask,
    matched: Vec<MatchedRule>,
}

impl MergedMasks {
    fn resolve(&self, coord: BitCoord) -> Resolution {
        if self.matched.is_empty() {
            Resolution::NoMatchingRule
        } else if self.forbid.is_set_at(coord) {
            Resolution::Forbidden
        } else if self.allow.is_set_at(coord) {
            Resolution::Allowed
        } else {
            Resolution::NotGranted
        }
    }
}

/// Evaluates requests against one compiled policy
///
/// Cheap to share across threads; the cache is the only mutable state.
pub struct AccessEvaluator {
    policy: Arc<CompiledPolicy>,
    cache: Arc<EvaluationCache>,
    config: EvaluatorConfig,
}

impl AccessEvaluator {
    /// Evaluator with its own cache sized by `config.cache`
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid `config`.
    pub fn new(policy: Arc<CompiledPolicy>, config: EvaluatorConfig) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(EvaluationCache::new(config.cache.clone())?);
        Ok(Self::with_cache(policy, cache, config))
    }

    /// Evaluator sharing an existing cache
    ///
    /// Cache keys include the schema version, so evaluators for different
    /// policies can share one cache.
    pub fn with_cache(
        policy: Arc<CompiledPolicy>,
        cache: Arc<EvaluationCache>,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            policy,
            cache,
            config,
        }
    }

    pub fn policy(&self) -> &CompiledPolicy {
        &self.policy
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// `true` iff some matched rule allows `action` and none forbids it
    ///
    /// # Errors
    ///
    /// Returns a usage error for an unknown subject or action, or an unknown
    /// role while `strict_roles` is enabled.
    pub fn can(&self, request: &AccessRequest, action: &str) -> Result<bool> {
        self.decide(request, action).map(|decision| decision.allowed)
    }

    /// Full decision for `action`, with the rules that matched
    pub fn decide(&self, request: &AccessRequest, action: &str) -> Result<AccessDecision> {
        let subject = self.subject(request)?;
        let coord = subject.actions.coord(action).ok_or_else(|| {
            warn!("Rejecting request for unknown action {}.{}", subject.name, action);
            PolicyError::Usage(format!(
                "Unknown action '{}' for subject '{}'",
                action, subject.name
            ))
        })?;

        let merged = self.merge(request, subject)?;
        let resolution = merged.resolve(coord);
        let allowed = resolution == Resolution::Allowed;

        debug!(
            "Decision for {}.{}: {} ({:?}, {} rules matched)",
            subject.name,
            action,
            if allowed { "ALLOW" } else { "DENY" },
            resolution,
            merged.matched.len()
        );

        Ok(AccessDecision {
            allowed,
            subject: subject.name.clone(),
            action: action.to_string(),
            matched: merged.matched,
            resolution,
        })
    }

    /// Every action of the subject the request would allow, in bit order
    pub fn allowed_actions(&self, request: &AccessRequest) -> Result<Vec<String>> {
        self.actions_with(request, Resolution::Allowed)
    }

    /// Every action of the subject a matched forbid rule covers, in bit order
    pub fn forbidden_actions(&self, request: &AccessRequest) -> Result<Vec<String>> {
        self.actions_with(request, Resolution::Forbidden)
    }

    fn actions_with(&self, request: &AccessRequest, wanted: Resolution) -> Result<Vec<String>> {
        let subject = self.subject(request)?;
        let merged = self.merge(request, subject)?;
        Ok(subject
            .actions
            .names()
            .iter()
            .enumerate()
            .filter(|(bit, _)| merged.resolve(BitCoord::of(*bit)) == wanted)
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn subject(&self, request: &AccessRequest) -> Result<&CompiledSubject> {
        self.policy
            .subject(&request.subject)
            .ok_or_else(|| {
                warn!("Rejecting request for unknown subject '{}'", request.subject);
                PolicyError::Usage(format!("Unknown subject '{}'", request.subject))
            })
    }

    fn merge(&self, request: &AccessRequest, subject: &CompiledSubject) -> Result<MergedMasks> {
        let mut roles = Vec::with_capacity(request.roles.len());
        for name in &request.roles {
            match self.policy.role(name) {
                Some(role) => roles.push(role),
                None if self.config.strict_roles => {
                    warn!("Rejecting request with unknown role '{}'", name);
                    return Err(PolicyError::Usage(format!("Unknown role '{}'", name)));
                }
                None => warn!("Skipping unknown role '{}'", name),
            }
        }

        let vector = self.subject_vector(request, subject);
        let mut allow = Vec::new();
        let mut forbid = Vec::new();
        let mut matched = Vec::new();

        for role in roles {
            for (rule_index, rule) in role.rules_for(&subject.name).iter().enumerate() {
                if !truthy(vector.get(rule.condition)) {
                    continue;
                }
                match rule.mode {
                    AccessMode::Allow => allow.push(&rule.mask),
                    AccessMode::Forbid => forbid.push(&rule.mask),
                }
                matched.push(MatchedRule {
                    role: role.name.clone(),
                    rule_index,
                    mode: rule.mode,
                });
            }
        }

        Ok(MergedMasks {
            allow: Bitmask::or(allow),
            forbid: Bitmask::or(forbid),
            matched,
        })
    }

    fn subject_vector(&self, request: &AccessRequest, subject: &CompiledSubject) -> Arc<LazyVector> {
        let version = self.policy.schema_version();
        let common_key = common_key(version, &request.user, &request.environment);
        let common = self.cache.get_or_insert_with(&common_key, || {
            Arc::new(LazyVector::common(
                self.policy.common_module().clone(),
                request.user.clone(),
                request.environment.clone(),
            ))
        });

        let key = subject_key(version, &common_key, &subject.name, &request.instance);
        self.cache.get_or_insert_with(&key, || {
            Arc::new(LazyVector::subject(
                subject.module.clone(),
                common,
                request.instance.clone(),
            ))
        })
    }
}
