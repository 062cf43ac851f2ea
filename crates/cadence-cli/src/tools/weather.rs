//! Current weather lookup via wttr.in

use async_trait::async_trait;
use cadence_agent::{Tool, ToolError};

const WTTR_BASE_URL: &str = "https://wttr.in";

/// Tool for looking up the current weather of a city
pub struct WeatherTool {
    client: reqwest::Client,
    base_url: String,
}

impl WeatherTool {
    pub fn new() -> Self {
        Self::with_base_url(WTTR_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather conditions and temperature for a city"
    }

    fn input_hint(&self) -> &str {
        "city"
    }

    async fn invoke(&self, input: &str, _call_id: &str) -> Result<String, ToolError> {
        let city = input.trim();
        if city.is_empty() {
            return Err(ToolError::Failed("No city given".into()));
        }

        let url = format!(
            "{}/{}?format=%C+%t",
            self.base_url,
            urlencoding::encode(city)
        );
        tracing::debug!(%url, "Fetching weather");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("Weather request failed: {}", e)))?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "Weather lookup failed");
            return Ok("Sorry, I couldn't get the weather information for that city.".to_string());
        }

        let text = response
            .text()
            .await
            .map_err(|e| ToolError::Failed(format!("Weather response unreadable: {}", e)))?;

        Ok(format!("The weather in {} is {}.", city, text.trim()))
    }
}
