use url::Url;

static API_BASE_URL: Option<&'static str> = option_env!("API_BASE_URL");
static RAZORPAY_KEY_ID: Option<&'static str> = option_env!("RAZORPAY_KEY_ID");

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_base_url: Url,
    /// Public key of the payment gateway, if the build was given one.
    pub razorpay_key: Option<String>,
}

impl Config {
    pub fn new(api_base_url: &str, razorpay_key: Option<&str>) -> Result<Self, url::ParseError> {
        let api_base_url = Url::parse(api_base_url.trim_end_matches('/'))?;
        let razorpay_key = razorpay_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_owned);
        Ok(Self {
            api_base_url,
            razorpay_key,
        })
    }

    /// Configuration baked in at build time.
    pub fn from_env() -> Result<Self, url::ParseError> {
        Self::new(
            API_BASE_URL.unwrap_or(DEFAULT_API_BASE_URL),
            RAZORPAY_KEY_ID,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_is_absent() {
        let config = Config::new("https://api.example.com/api/", Some("  ")).unwrap();
        assert_eq!(config.razorpay_key, None);
        assert_eq!(config.api_base_url.as_str(), "https://api.example.com/api");
    }

    #[test]
    fn invalid_base_url() {
        assert!(Config::new("not a url", None).is_err());
    }
}
