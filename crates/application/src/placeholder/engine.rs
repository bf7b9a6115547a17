//! Placeholder resolution engine
//!
//! Resolves placeholders in one scan over the template. Substituted values
//! are opaque: an input that looks like `{ENV:HOME}` is inserted literally
//! and never scanned again. Arguments are resolved before the placeholder
//! holding them, so `{BASE64:{INPUT}}` encodes the input. Resolved names are
//! reported in pass order: literal input, computed values, environment
//! lookups, user variables, then encoding transforms.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tether_domain::{Placeholder, PlaceholderKind};

use super::PlaceholderError;
use super::builtins::{DynamicPlaceholders, encode};
use super::parser::scan_top_level;

/// Environment lookup function.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Inputs available to one resolution.
#[derive(Clone, Default)]
pub struct ResolutionContext {
    /// Value for `{INPUT}`.
    pub input: Option<String>,
    /// User variables.
    pub variables: BTreeMap<String, String>,
    /// Lookup for `{ENV:NAME}`; no lookup means environment placeholders stay unresolved.
    pub env: Option<EnvLookup>,
    /// Fail on the first unresolved placeholder.
    pub strict: bool,
    /// Substitute for unresolved placeholders in lenient mode.
    pub fallback: String,
    /// Time used by computed placeholders; the current time when absent.
    pub now: Option<DateTime<Utc>>,
}

impl fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("input", &self.input.as_ref().map(|_| "[set]"))
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("env", &self.env.is_some())
            .field("strict", &self.strict)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl ResolutionContext {
    /// Creates an empty, lenient context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `{INPUT}` value.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Adds a user variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Replaces the user variables.
    #[must_use]
    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    /// Reads `{ENV:NAME}` from the process environment.
    #[must_use]
    pub fn with_process_env(mut self) -> Self {
        self.env = Some(Arc::new(|name| std::env::var(name).ok()));
        self
    }

    /// Reads `{ENV:NAME}` from a fixed map.
    #[must_use]
    pub fn with_env_map(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(Arc::new(move |name| env.get(name).cloned()));
        self
    }

    /// Enables or disables strict mode.
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets the lenient-mode fallback.
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Pins the time used by computed placeholders.
    #[must_use]
    pub const fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

/// Result of resolving one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult {
    /// The template with placeholders substituted.
    pub output: String,
    /// Names that were resolved, each listed once.
    pub resolved_names: Vec<String>,
    /// Names that could not be resolved, each listed once.
    pub unresolved_names: Vec<String>,
    /// Whether every placeholder was resolved.
    pub complete: bool,
}

/// The placeholder resolution engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderResolver;

/// State of one `resolve` call.
struct Session<'a> {
    context: &'a ResolutionContext,
    now: DateTime<Utc>,
    /// Computed values keyed by name and argument, so repeated occurrences agree.
    dynamic_cache: HashMap<(String, Option<String>), String>,
    /// Resolved names with the rank of their pass.
    resolved: Vec<(usize, String)>,
    unresolved: Vec<String>,
}

const PASSES: [PlaceholderKind; 5] = [
    PlaceholderKind::LiteralInput,
    PlaceholderKind::ComputedDynamic,
    PlaceholderKind::EnvironmentLookup,
    PlaceholderKind::UserVariable,
    PlaceholderKind::EncodingTransform,
];

fn pass_rank(kind: PlaceholderKind) -> usize {
    PASSES.iter().position(|pass| *pass == kind).unwrap_or(PASSES.len())
}

impl Session<'_> {
    fn lookup(&mut self, placeholder: &Placeholder) -> Option<String> {
        let argument = placeholder.argument.as_deref();
        match placeholder.kind {
            PlaceholderKind::LiteralInput => self.context.input.clone(),
            PlaceholderKind::ComputedDynamic => {
                let key = (placeholder.name.clone(), placeholder.argument.clone());
                if let Some(cached) = self.dynamic_cache.get(&key) {
                    return Some(cached.clone());
                }
                let value = DynamicPlaceholders::compute(&placeholder.name, argument, self.now)?;
                self.dynamic_cache.insert(key, value.clone());
                Some(value)
            }
            PlaceholderKind::EnvironmentLookup => {
                let lookup = self.context.env.as_ref()?;
                argument.and_then(|name| lookup(name))
            }
            PlaceholderKind::UserVariable => self.context.variables.get(&placeholder.name).cloned(),
            PlaceholderKind::EncodingTransform => encode(&placeholder.name, argument?),
        }
    }

    /// Rewrites every occurrence in `input`, innermost arguments first.
    ///
    /// Only the template text is scanned; substituted values are copied as is.
    fn rewrite(&mut self, input: &str) -> Result<String, PlaceholderError> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for occurrence in scan_top_level(input) {
            out.push_str(&input[last..occurrence.start]);
            let argument = occurrence
                .argument
                .map(|(from, to)| self.rewrite(&input[from..to]))
                .transpose()?;
            let placeholder = Placeholder::new(
                occurrence.name,
                argument,
                occurrence.start..occurrence.end,
                &input[occurrence.start..occurrence.end],
            );

            let value = match self.lookup(&placeholder) {
                Some(value) => {
                    let name = placeholder.display_name();
                    if !self.resolved.iter().any(|(_, seen)| *seen == name) {
                        self.resolved.push((pass_rank(placeholder.kind), name));
                    }
                    value
                }
                None if self.context.strict => {
                    return Err(PlaceholderError::Unresolved {
                        name: placeholder.display_name(),
                        kind: placeholder.kind,
                    });
                }
                None => {
                    let name = placeholder.display_name();
                    if !self.unresolved.contains(&name) {
                        self.unresolved.push(name);
                    }
                    self.context.fallback.clone()
                }
            };
            out.push_str(&value);
            last = occurrence.end;
        }
        out.push_str(&input[last..]);
        Ok(out)
    }
}

impl PlaceholderResolver {
    /// Creates a resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Resolves every placeholder in `template`.
    ///
    /// Computed values are generated once per call: two `{UUID}` in one
    /// template agree, a second call produces fresh values.
    ///
    /// # Errors
    ///
    /// In strict mode, returns [`PlaceholderError::Unresolved`] for the first
    /// placeholder without a value.
    pub fn resolve(
        &self,
        template: &str,
        context: &ResolutionContext,
    ) -> Result<ResolutionResult, PlaceholderError> {
        let mut session = Session {
            context,
            now: context.now.unwrap_or_else(Utc::now),
            dynamic_cache: HashMap::new(),
            resolved: Vec::new(),
            unresolved: Vec::new(),
        };
        let output = session.rewrite(template)?;

        session.resolved.sort_by_key(|(rank, _)| *rank);
        Ok(ResolutionResult {
            output,
            complete: session.unresolved.is_empty(),
            resolved_names: session.resolved.into_iter().map(|(_, name)| name).collect(),
            unresolved_names: session.unresolved,
        })
    }

    /// Resolves an optional template; `None` stays `None`.
    ///
    /// # Errors
    ///
    /// See [`PlaceholderResolver::resolve`].
    pub fn resolve_opt(
        &self,
        template: Option<&str>,
        context: &ResolutionContext,
    ) -> Result<Option<ResolutionResult>, PlaceholderError> {
        template.map(|t| self.resolve(t, context)).transpose()
    }
}
