//! Temperature tool
//!
//! The single tool this server exposes: report a made-up temperature for a city.


use crate::mcp::{CallToolParams, CallToolResult, McpError, Tool, ToolHandler};
use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::ops::RangeInclusive;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Name the tool is advertised under
pub const TOOL_NAME: &str = "get_current_temperature";

/// Human-readable tool description
pub const TOOL_DESCRIPTION: &str = "Get current temperature for a location.";

/// Reported temperatures are drawn from this range, in degrees Celsius
pub const TEMPERATURE_RANGE_CELSIUS: RangeInclusive<i32> = 0..=30;

/// Render the sentence returned to callers
#[inline]
pub fn current_temperature_report(city: &str, temperature: i32) -> String {
    format!("The current temperature in {city} is {temperature}°C.")
}

/// Source of temperature readings
pub trait TemperatureSource: Send + Sync {
    /// Draw one value from `range`
    fn sample(&self, range: RangeInclusive<i32>) -> i32;
}

/// Uniform samples from the calling thread's generator
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSource;

impl TemperatureSource for ThreadRngSource {
    #[inline]
    fn sample(&self, range: RangeInclusive<i32>) -> i32 {
        rand::rng().random_range(range)
    }
}

/// Deterministic samples from a seeded generator
#[derive(Debug)]
pub struct SeededSource {
    rng: Mutex<StdRng>,
}

impl SeededSource {
    #[inline]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl TemperatureSource for SeededSource {
    #[inline]
    fn sample(&self, range: RangeInclusive<i32>) -> i32 {
        // A panic mid-sample cannot leave the generator in a bad state
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random_range(range)
    }
}

/// Test double that always reports the same value
///
/// The requested range is ignored and the value is not clamped to
/// [`TEMPERATURE_RANGE_CELSIUS`], so out-of-range readings can be scripted.
#[derive(Debug, Clone, Copy)]
pub struct FixedSource(pub i32);

impl TemperatureSource for FixedSource {
    #[inline]
    fn sample(&self, _range: RangeInclusive<i32>) -> i32 {
        self.0
    }
}

/// `get_current_temperature` tool handler
pub struct GetCurrentTemperatureHandler {
    source: Box<dyn TemperatureSource>,
}

impl GetCurrentTemperatureHandler {
    /// Create a handler drawing temperatures from `source`
    #[inline]
    pub fn new<S>(source: S) -> Self
    where
        S: TemperatureSource + 'static,
    {
        Self {
            source: Box::new(source),
        }
    }

    /// Create the get_current_temperature tool definition
    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: TOOL_NAME.to_string(),
            description: Some(TOOL_DESCRIPTION.to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "city": {
                        "type": "string",
                        "description": "The name of the city."
                    }
                },
                "required": ["city"]
            }),
        }
    }

    /// Report a fresh temperature for `city`
    #[inline]
    pub fn report(&self, city: &str) -> String {
        let temperature = self.source.sample(TEMPERATURE_RANGE_CELSIUS);
        debug!("Sampled {}°C for '{}'", temperature, city);
        current_temperature_report(city, temperature)
    }
}

impl Default for GetCurrentTemperatureHandler {
    #[inline]
    fn default() -> Self {
        Self::new(ThreadRngSource)
    }
}

#[async_trait]
impl ToolHandler for GetCurrentTemperatureHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();

        let city = args
            .get("city")
            .and_then(|v| v.as_str())
            .ok_or_else(|| McpError::InvalidToolParameters {
                tool: TOOL_NAME.to_string(),
                message: "Missing required string parameter: city".to_string(),
            })?;

        Ok(CallToolResult::text(self.report(city)))
    }
}
