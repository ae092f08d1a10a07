//! Source entitlement, site switches and identities read from settings.

use async_trait::async_trait;
use subtle::ConstantTimeEq;

use crate::{
    application::ports::{
        CatalogError, IdentityResolver, SiteConfigProvider, SourceCatalog, UserPreferences,
    },
    config::UserSettings,
    domain::{
        identity::Identity,
        source::{SiteConfig, SourceDescriptor},
    },
};

#[derive(Debug, Clone)]
pub struct ConfiguredCatalog {
    sources: Vec<SourceDescriptor>,
    users: Vec<UserSettings>,
    site: SiteConfig,
}

impl ConfiguredCatalog {
    pub fn new(sources: Vec<SourceDescriptor>, users: Vec<UserSettings>, site: SiteConfig) -> Self {
        Self {
            sources,
            users,
            site,
        }
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    fn user(&self, identity: &Identity) -> Option<&UserSettings> {
        self.users
            .iter()
            .find(|user| user.username == identity.username())
    }
}

#[async_trait]
impl SourceCatalog for ConfiguredCatalog {
    async fn available_sources(
        &self,
        identity: &Identity,
    ) -> Result<Vec<SourceDescriptor>, CatalogError> {
        let user = self.user(identity).ok_or_else(|| {
            CatalogError::Unavailable(format!("no user record for `{}`", identity.username()))
        })?;
        Ok(self
            .sources
            .iter()
            .filter(|source| source.is_enabled())
            .filter(|source| {
                user.sources
                    .as_ref()
                    .is_none_or(|allowed| allowed.iter().any(|key| key == &source.key))
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SiteConfigProvider for ConfiguredCatalog {
    async fn site_config(&self) -> Result<SiteConfig, CatalogError> {
        Ok(self.site.clone())
    }
}

impl IdentityResolver for ConfiguredCatalog {
    fn authenticate(&self, token: &str) -> Option<Identity> {
        if token.is_empty() {
            return None;
        }
        // No early exit: every record is compared.
        let mut matched = None;
        for user in &self.users {
            if user.token.as_bytes().ct_eq(token.as_bytes()).unwrap_u8() == 1 && matched.is_none() {
                matched = Some(user);
            }
        }
        matched.and_then(|user| Identity::new(user.username.clone()).ok())
    }

    fn preferences(&self, identity: &Identity) -> UserPreferences {
        self.user(identity)
            .map(|user| UserPreferences {
                proxy: user.proxy.clone(),
                image_proxy: user.image_proxy.clone(),
            })
            .unwrap_or_default()
    }
}
