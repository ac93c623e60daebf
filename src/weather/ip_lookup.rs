//! Public IP geolocation
//!
//! Three free providers are asked in turn (ipapi.co, ipwho.is, ip-api.com);
//! the first one that reports a city or a coordinate wins. Provider failures
//! only move the lookup on to the next provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

use super::open_meteo::check_status;
use super::{IpLocation, IpLocator};
use crate::config::IpLookupConfig;
use crate::error::{Result, WeatherwiseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    IpApi,
    IpWhoIs,
    IpApiCom,
}

impl Provider {
    const CHAIN: [Self; 3] = [Self::IpApi, Self::IpWhoIs, Self::IpApiCom];
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IpApi => "ipapi.co",
            Self::IpWhoIs => "ipwho.is",
            Self::IpApiCom => "ip-api.com",
        })
    }
}

/// Chained client over the configured IP geolocation providers
#[derive(Debug, Clone)]
pub struct IpLookupClient {
    client: Client,
    config: IpLookupConfig,
}

impl IpLookupClient {
    pub fn new(config: &IpLookupConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("weatherwise/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| WeatherwiseError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn url(&self, provider: Provider) -> &str {
        match provider {
            Provider::IpApi => &self.config.ipapi_url,
            Provider::IpWhoIs => &self.config.ipwhois_url,
            Provider::IpApiCom => &self.config.ip_api_url,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, provider: Provider) -> Result<T> {
        let response = self.client.get(self.url(provider)).send().await?;
        let response = check_status(response, &provider.to_string()).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| WeatherwiseError::parse(format!("Failed to parse {provider} response: {e}")))
    }

    async fn query(&self, provider: Provider) -> Result<Option<IpLocation>> {
        Ok(match provider {
            Provider::IpApi => self.get_json::<answers::IpApi>(provider).await?.into_location(),
            Provider::IpWhoIs => self.get_json::<answers::IpWhoIs>(provider).await?.into_location(),
            Provider::IpApiCom => self.get_json::<answers::IpApiCom>(provider).await?.into_location(),
        })
    }
}

#[async_trait]
impl IpLocator for IpLookupClient {
    #[instrument(skip(self))]
    async fn locate(&self) -> Result<IpLocation> {
        for provider in Provider::CHAIN {
            match self.query(provider).await {
                Ok(Some(location)) => {
                    debug!(%provider, city = ?location.city, "IP location found");
                    return Ok(location);
                }
                Ok(None) => debug!(%provider, "provider had no location"),
                Err(e) => debug!(%provider, error = %e, "IP lookup failed"),
            }
        }
        Err(WeatherwiseError::network("no IP geolocation provider answered"))
    }
}

/// Provider answer shapes
mod answers {
    use super::IpLocation;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct IpApi {
        #[serde(default)]
        pub error: bool,
        pub city: Option<String>,
        pub region_city: Option<String>,
        pub latitude: Option<f64>,
        pub longitude: Option<f64>,
    }

    impl IpApi {
        pub fn into_location(self) -> Option<IpLocation> {
            if self.error {
                return None;
            }
            IpLocation::from_parts(self.city.or(self.region_city), self.latitude, self.longitude)
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct IpWhoIs {
        pub success: Option<bool>,
        pub city: Option<String>,
        pub latitude: Option<f64>,
        pub longitude: Option<f64>,
    }

    impl IpWhoIs {
        pub fn into_location(self) -> Option<IpLocation> {
            if self.success == Some(false) {
                return None;
            }
            IpLocation::from_parts(self.city, self.latitude, self.longitude)
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct IpApiCom {
        pub status: Option<String>,
        pub city: Option<String>,
        pub lat: Option<f64>,
        pub lon: Option<f64>,
    }

    impl IpApiCom {
        pub fn into_location(self) -> Option<IpLocation> {
            if self.status.as_deref() != Some("success") {
                return None;
            }
            IpLocation::from_parts(self.city, self.lat, self.lon)
        }
    }
}
