//! Protocol registry
//!
//! Maps each [`ProtocolType`] to a factory that builds its strategy from the
//! shared [`StrategyContext`]. The registry is constructed explicitly; there
//! is no global instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use tether_domain::ProtocolType;

use crate::error::RegistryError;
use crate::protocols::{
    ApiKeyStrategy, AuthorizationCodeStrategy, BasicStrategy, ClientCredentialsStrategy,
    CurlStrategy, GraphQlStrategy, KeylessScraperStrategy, ProtocolStrategy, RepoRunnerStrategy,
    SoapStrategy, StrategyContext, WebSocketStrategy,
};

/// Builds a strategy instance from the shared collaborators.
pub type StrategyFactory =
    Arc<dyn Fn(&StrategyContext) -> Arc<dyn ProtocolStrategy> + Send + Sync>;

/// Registry of protocol strategy factories.
#[derive(Clone)]
pub struct ProtocolRegistry {
    context: StrategyContext,
    factories: BTreeMap<ProtocolType, StrategyFactory>,
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("types", &self.list_types())
            .finish_non_exhaustive()
    }
}

fn factory<S, F>(build: F) -> StrategyFactory
where
    S: ProtocolStrategy + 'static,
    F: Fn(StrategyContext) -> S + Send + Sync + 'static,
{
    Arc::new(move |context: &StrategyContext| Arc::new(build(context.clone())) as Arc<dyn ProtocolStrategy>)
}

impl ProtocolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(context: StrategyContext) -> Self {
        Self {
            context,
            factories: BTreeMap::new(),
        }
    }

    /// Creates a registry with every built-in protocol registered.
    #[must_use]
    pub fn with_defaults(context: StrategyContext) -> Self {
        let mut registry = Self::new(context);
        registry.register(ProtocolType::Curl, factory(CurlStrategy::new));
        registry.register(
            ProtocolType::OAuth2AuthorizationCode,
            factory(AuthorizationCodeStrategy::new),
        );
        registry.register(ProtocolType::OAuth2Pkce, factory(AuthorizationCodeStrategy::pkce));
        registry.register(
            ProtocolType::OAuth2ClientCredentials,
            factory(ClientCredentialsStrategy::new),
        );
        registry.register(ProtocolType::ApiKey, factory(ApiKeyStrategy::new));
        registry.register(ProtocolType::Basic, factory(BasicStrategy::new));
        registry.register(ProtocolType::GraphQl, factory(GraphQlStrategy::new));
        registry.register(ProtocolType::WebSocket, factory(WebSocketStrategy::new));
        registry.register(ProtocolType::Soap, factory(SoapStrategy::new));
        registry.register(ProtocolType::RepoRunner, factory(RepoRunnerStrategy::new));
        registry.register(
            ProtocolType::KeylessScraper,
            factory(KeylessScraperStrategy::new),
        );
        registry
    }

    /// Registers (or replaces) the factory for `protocol`.
    pub fn register(&mut self, protocol: ProtocolType, factory: StrategyFactory) {
        self.factories.insert(protocol, factory);
    }

    /// Builds the strategy for `protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotRegistered`] when no factory exists.
    pub fn create_handler(
        &self,
        protocol: ProtocolType,
    ) -> Result<Arc<dyn ProtocolStrategy>, RegistryError> {
        self.factories
            .get(&protocol)
            .map(|build| build(&self.context))
            .ok_or(RegistryError::NotRegistered(protocol))
    }

    /// Builds the strategy for a protocol identifier such as `"oauth2_pkce"`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownProtocol`] for identifiers outside the
    /// closed set.
    pub fn create_handler_by_name(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ProtocolStrategy>, RegistryError> {
        let protocol: ProtocolType = name
            .parse()
            .map_err(|_| RegistryError::UnknownProtocol(name.to_string()))?;
        self.create_handler(protocol)
    }

    /// Lists the registered protocol types in declaration order.
    #[must_use]
    pub fn list_types(&self) -> Vec<ProtocolType> {
        self.factories.keys().copied().collect()
    }

    /// Returns true if `protocol` has a factory.
    #[must_use]
    pub fn is_registered(&self, protocol: ProtocolType) -> bool {
        self.factories.contains_key(&protocol)
    }

    /// The collaborators handed to every factory.
    #[must_use]
    pub const fn context(&self) -> &StrategyContext {
        &self.context
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ports::ScriptedTransport;
    use crate::protocols::test_support::context;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_cover_every_protocol() {
        let (ctx, _) = context(&ScriptedTransport::new());
        let registry = ProtocolRegistry::with_defaults(ctx);
        assert_eq!(registry.list_types(), ProtocolType::all().to_vec());
        for protocol in ProtocolType::all() {
            let handler = registry.create_handler(*protocol).unwrap();
            assert_eq!(handler.protocol_type(), *protocol);
        }
    }

    #[test]
    fn test_unknown_protocol_errors() {
        let (ctx, _) = context(&ScriptedTransport::new());
        let registry = ProtocolRegistry::with_defaults(ctx.clone());

        let err = registry.create_handler_by_name("carrier_pigeon").err().unwrap();
        assert!(err.to_string().contains("unknown protocol type"));

        let empty = ProtocolRegistry::new(ctx);
        let err = empty.create_handler(ProtocolType::Soap).err().unwrap();
        assert_eq!(err, RegistryError::NotRegistered(ProtocolType::Soap));
        assert!(err.to_string().contains("unknown protocol type"));
    }

    #[test]
    fn test_register_replaces_factory() {
        let (ctx, _) = context(&ScriptedTransport::new());
        let mut registry = ProtocolRegistry::new(ctx);
        registry.register(ProtocolType::Basic, factory(CurlStrategy::new));
        assert!(registry.is_registered(ProtocolType::Basic));
        let handler = registry.create_handler_by_name("BASIC").unwrap();
        assert_eq!(handler.protocol_type(), ProtocolType::Curl);
    }
}
