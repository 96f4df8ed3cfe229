// Choose between the primary (Gemini) and secondary (OpenAI) provider
// Selection looks only at credential presence; resolution also survives construction failures


use std::fmt;

use tracing::{debug, warn};

use super::Provider;
use crate::RagError;
use crate::config::interactive::mask_secret;

/// API keys as configured; blank keys count as absent
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    gemini: Option<String>,
    openai: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("gemini", &self.gemini.as_deref().map(mask_secret))
            .field("openai", &self.openai.as_deref().map(mask_secret))
            .finish()
    }
}

impl Credentials {
    #[inline]
    pub fn new(gemini: Option<String>, openai: Option<String>) -> Self {
        let present = |key: Option<String>| {
            key.map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        };
        Self {
            gemini: present(gemini),
            openai: present(openai),
        }
    }

    #[inline]
    pub fn has(&self, provider: Provider) -> bool {
        self.key(provider).is_some()
    }

    #[inline]
    pub fn key(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Gemini => self.gemini.as_deref(),
            Provider::OpenAi => self.openai.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Primary,
    Secondary,
    None,
}

impl Selection {
    #[inline]
    pub fn provider(self) -> Option<Provider> {
        match self {
            Self::Primary => Some(Provider::PRIMARY),
            Self::Secondary => Some(Provider::SECONDARY),
            Self::None => None,
        }
    }
}

/// A client built for the provider that ended up being used
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub provider: Provider,
    pub selection: Selection,
    pub client: T,
}

/// The active client plus, when available, a standby for call-time failures
#[derive(Debug, Clone)]
pub struct Failover<T> {
    pub active: Resolved<T>,
    pub standby: Option<Resolved<T>>,
}

impl<T> Failover<T> {
    #[inline]
    pub fn provider(&self) -> Provider {
        self.active.provider
    }
}

#[inline]
pub fn select(credentials: &Credentials) -> Selection {
    if credentials.has(Provider::PRIMARY) {
        Selection::Primary
    } else if credentials.has(Provider::SECONDARY) {
        Selection::Secondary
    } else {
        Selection::None
    }
}

/// Build a client for the selected provider, substituting the secondary when the
/// primary cannot be constructed
pub fn resolve<T, F>(credentials: &Credentials, build: F) -> crate::Result<Resolved<T>>
where
    F: Fn(Provider) -> anyhow::Result<T>,
{
    match select(credentials) {
        Selection::None => Err(RagError::NoProviderConfigured),
        Selection::Secondary => {
            let client = build(Provider::SECONDARY)
                .map_err(|e| provider_error(Provider::SECONDARY, &e))?;
            debug!("Using {} (no {} credential)", Provider::SECONDARY, Provider::PRIMARY);
            Ok(Resolved {
                provider: Provider::SECONDARY,
                selection: Selection::Secondary,
                client,
            })
        }
        Selection::Primary => match build(Provider::PRIMARY) {
            Ok(client) => Ok(Resolved {
                provider: Provider::PRIMARY,
                selection: Selection::Primary,
                client,
            }),
            Err(primary_error) if credentials.has(Provider::SECONDARY) => {
                warn!(
                    "Failed to initialize {}: {:#}. Falling back to {}",
                    Provider::PRIMARY,
                    primary_error,
                    Provider::SECONDARY
                );
                let client = build(Provider::SECONDARY)
                    .map_err(|e| provider_error(Provider::SECONDARY, &e))?;
                Ok(Resolved {
                    provider: Provider::SECONDARY,
                    selection: Selection::Secondary,
                    client,
                })
            }
            Err(primary_error) => Err(provider_error(Provider::PRIMARY, &primary_error)),
        },
    }
}

/// Like [`resolve`], keeping the secondary ready when the primary is active
pub fn resolve_failover<T, F>(credentials: &Credentials, build: F) -> crate::Result<Failover<T>>
where
    F: Fn(Provider) -> anyhow::Result<T>,
{
    let active = resolve(credentials, &build)?;

    let standby = if active.provider == Provider::PRIMARY && credentials.has(Provider::SECONDARY) {
        match build(Provider::SECONDARY) {
            Ok(client) => Some(Resolved {
                provider: Provider::SECONDARY,
                selection: Selection::Secondary,
                client,
            }),
            Err(e) => {
                warn!("Standby provider {} unavailable: {:#}", Provider::SECONDARY, e);
                None
            }
        }
    } else {
        None
    };

    Ok(Failover { active, standby })
}

/// Collection holding vectors produced by `provider`
#[inline]
pub fn collection_name(base: &str, provider: Provider) -> String {
    format!("{}_{}", base, provider.collection_suffix())
}

fn provider_error(provider: Provider, error: &anyhow::Error) -> RagError {
    RagError::Provider(format!("Failed to initialize {}: {:#}", provider, error))
}
