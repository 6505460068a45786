use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub inventory_service_url: String,
    /// When set, stock reductions already applied during a failed order
    /// placement are restored best-effort instead of being left in place.
    pub compensate_stock_on_abort: bool,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub iyzico: IyzicoConfig,
    pub stripe_enabled: bool,
    pub paypal_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct IyzicoConfig {
    pub enabled: bool,
    pub api_key: String,
    pub secret_key: String,
    pub base_url: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let inventory_service_url = env::var("INVENTORY_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:8081".to_string());

        Ok(Self {
            database_url,
            host,
            port,
            inventory_service_url,
            compensate_stock_on_abort: env_flag("STOCK_COMPENSATION_ENABLED", false),
            providers: ProvidersConfig {
                iyzico: IyzicoConfig {
                    enabled: env_flag("IYZICO_ENABLED", true),
                    api_key: env::var("IYZICO_API_KEY").unwrap_or_default(),
                    secret_key: env::var("IYZICO_SECRET_KEY").unwrap_or_default(),
                    base_url: env::var("IYZICO_BASE_URL")
                        .unwrap_or_else(|_| "https://sandbox-api.iyzipay.com".to_string()),
                },
                stripe_enabled: env_flag("STRIPE_ENABLED", false),
                paypal_enabled: env_flag("PAYPAL_ENABLED", false),
            },
        })
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::env_flag;

    #[test]
    fn env_flag_falls_back_to_default() {
        assert!(env_flag("AXUM_CHECKOUT_UNSET_FLAG", true));
        assert!(!env_flag("AXUM_CHECKOUT_UNSET_FLAG", false));
    }
}
