//! High-level Yeelight SDK built on top of the miio protocol client.
//!
//! Every operation is a single `invoke` on the underlying [`MiioClient`];
//! arguments are range-checked locally before anything is sent.
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use miio::messages::Param;
use miio::{MiioClient, MiioError};
use serde::Serialize;
use tracing::debug;

/// Shortest transition the light accepts.
pub const MIN_DURATION: Duration = Duration::from_millis(30);
pub const BRIGHTNESS_RANGE: std::ops::RangeInclusive<u8> = 1..=100;
pub const COLOR_TEMPERATURE_RANGE: std::ops::RangeInclusive<u16> = 1700..=6500;
pub const PERCENTAGE_RANGE: std::ops::RangeInclusive<i8> = -100..=100;

/// Properties read by [`Light::state`], in reply order.
pub const STATE_PROPERTIES: [&str; 23] = [
    "power",
    "bright",
    "ct",
    "rgb",
    "hue",
    "sat",
    "color_mode",
    "flowing",
    "delayoff",
    "flow_params",
    "music_on",
    "name",
    "bg_power",
    "bg_flowing",
    "bg_flow_params",
    "bg_ct",
    "bg_lmode",
    "bg_bright",
    "bg_rgb",
    "bg_hue",
    "bg_sat",
    "nl_br",
    "active_mode",
];

#[derive(Debug, thiserror::Error)]
pub enum LightError {
    #[error(transparent)]
    Client(#[from] MiioError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The light answered with an empty value for the property.
    #[error("property {0} not supported by this light")]
    Unsupported(&'static str),
    #[error("unexpected value {value:?} for {property}")]
    UnexpectedValue { property: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, LightError>;

/// Transition effect for power, brightness and color temperature changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effect {
    /// Jump to the target; the duration is ignored by the light.
    Sudden,
    #[default]
    Smooth,
}

impl Effect {
    fn as_str(self) -> &'static str {
        match self {
            Effect::Sudden => "sudden",
            Effect::Smooth => "smooth",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdjustAction {
    Increase,
    Decrease,
    /// Increase until the maximum, then wrap to the minimum.
    #[default]
    Circle,
}

impl AdjustAction {
    fn as_str(self) -> &'static str {
        match self {
            AdjustAction::Increase => "increase",
            AdjustAction::Decrease => "decrease",
            AdjustAction::Circle => "circle",
        }
    }
}

/// Snapshot of all properties; `None` where the light reported nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LightState {
    pub power: Option<bool>,
    pub brightness: Option<u8>,
    pub color_temperature: Option<u16>,
    pub color: Option<u32>,
    pub hue: Option<u16>,
    pub saturation: Option<u8>,
    /// 1 rgb, 2 color temperature, 3 hsv.
    pub color_mode: Option<u8>,
    pub flowing: Option<bool>,
    /// Minutes left on the sleep timer.
    pub delay_off: Option<u32>,
    pub flow_parameters: Option<String>,
    pub music: Option<bool>,
    pub name: Option<String>,
    pub bg_power: Option<bool>,
    pub bg_flowing: Option<bool>,
    pub bg_flow_parameters: Option<String>,
    pub bg_color_temperature: Option<u16>,
    pub bg_light_mode: Option<u8>,
    pub bg_brightness: Option<u8>,
    pub bg_color: Option<u32>,
    pub bg_hue: Option<u16>,
    pub bg_saturation: Option<u8>,
    pub night_light_brightness: Option<u8>,
    /// 0 daylight, 1 moonlight (ceiling lights only).
    pub active_mode: Option<u8>,
}

impl LightState {
    /// Builds the state from a positional `get_prop` reply for
    /// [`STATE_PROPERTIES`]. Missing trailing values read as `None`.
    pub fn from_props(values: &[String]) -> Result<Self> {
        let p = |idx: usize| values.get(idx).map(String::as_str).filter(|v| !v.is_empty());
        Ok(Self {
            power: p(0).map(|v| v == "on"),
            brightness: parse(p(1), "bright")?,
            color_temperature: parse(p(2), "ct")?,
            color: parse(p(3), "rgb")?,
            hue: parse(p(4), "hue")?,
            saturation: parse(p(5), "sat")?,
            color_mode: parse(p(6), "color_mode")?,
            flowing: flag(p(7), "flowing")?,
            delay_off: parse(p(8), "delayoff")?,
            flow_parameters: p(9).map(str::to_owned),
            music: flag(p(10), "music_on")?,
            name: p(11).map(str::to_owned),
            bg_power: p(12).map(|v| v == "on"),
            bg_flowing: flag(p(13), "bg_flowing")?,
            bg_flow_parameters: p(14).map(str::to_owned),
            bg_color_temperature: parse(p(15), "bg_ct")?,
            bg_light_mode: parse(p(16), "bg_lmode")?,
            bg_brightness: parse(p(17), "bg_bright")?,
            bg_color: parse(p(18), "bg_rgb")?,
            bg_hue: parse(p(19), "bg_hue")?,
            bg_saturation: parse(p(20), "bg_sat")?,
            night_light_brightness: parse(p(21), "nl_br")?,
            active_mode: parse(p(22), "active_mode")?,
        })
    }
}

fn parse<T: FromStr>(value: Option<&str>, property: &'static str) -> Result<Option<T>> {
    value
        .map(|v| {
            v.trim().parse().map_err(|_| LightError::UnexpectedValue {
                property,
                value: v.to_owned(),
            })
        })
        .transpose()
}

fn flag(value: Option<&str>, property: &'static str) -> Result<Option<bool>> {
    Ok(parse::<u8>(value, property)?.map(|v| v == 1))
}

fn check_duration(duration: Duration) -> Result<Param> {
    if duration < MIN_DURATION {
        return Err(LightError::InvalidArgument(format!(
            "duration must be at least {} ms, got {} ms",
            MIN_DURATION.as_millis(),
            duration.as_millis()
        )));
    }
    Ok(Param::from(u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)))
}

fn check_brightness(brightness: u8) -> Result<Param> {
    if !BRIGHTNESS_RANGE.contains(&brightness) {
        return Err(LightError::InvalidArgument(format!(
            "brightness must be within 1..=100, got {brightness}"
        )));
    }
    Ok(Param::from(brightness))
}

fn check_color_temperature(kelvin: u16) -> Result<Param> {
    if !COLOR_TEMPERATURE_RANGE.contains(&kelvin) {
        return Err(LightError::InvalidArgument(format!(
            "color temperature must be within 1700..=6500 K, got {kelvin}"
        )));
    }
    Ok(Param::from(kelvin))
}

fn check_percentage(percentage: i8) -> Result<Param> {
    if !PERCENTAGE_RANGE.contains(&percentage) {
        return Err(LightError::InvalidArgument(format!(
            "percentage must be within -100..=100, got {percentage}"
        )));
    }
    Ok(Param::from(i64::from(percentage)))
}

/// A Yeelight reachable over the miio LAN protocol.
#[derive(Debug)]
pub struct Light {
    client: MiioClient,
}

impl Light {
    /// Connects with the default client configuration.
    pub async fn connect(ip: IpAddr, token: &str) -> Result<Self> {
        Ok(Self::from_client(MiioClient::connect(ip, token).await?))
    }

    pub fn from_client(client: MiioClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &MiioClient {
        &self.client
    }

    async fn acknowledged(&self, method: &str, params: &[Param]) -> Result<bool> {
        let result = self.client.invoke(method, params).await?;
        let ok = result.first().map(String::as_str) == Some("ok");
        debug!(method, ok, "light command acknowledged");
        Ok(ok)
    }

    async fn property(&self, property: &'static str) -> Result<String> {
        let result = self.client.invoke("get_prop", &[Param::from(property)]).await?;
        match result.into_iter().next() {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(LightError::Unsupported(property)),
        }
    }

    /// Flips the power state. Returns whether the light acknowledged.
    pub async fn toggle(&self) -> Result<bool> {
        self.acknowledged("toggle", &[]).await
    }

    pub async fn set_power(&self, on: bool, effect: Effect, duration: Duration) -> Result<bool> {
        let duration = check_duration(duration)?;
        let power = if on { "on" } else { "off" };
        self.acknowledged(
            "set_power",
            &[Param::from(power), Param::from(effect.as_str()), duration],
        )
        .await
    }

    pub async fn power(&self) -> Result<bool> {
        Ok(self.property("power").await? == "on")
    }

    /// Sets brightness in percent (1..=100).
    pub async fn set_brightness(
        &self,
        brightness: u8,
        effect: Effect,
        duration: Duration,
    ) -> Result<bool> {
        let brightness = check_brightness(brightness)?;
        let duration = check_duration(duration)?;
        self.acknowledged(
            "set_bright",
            &[brightness, Param::from(effect.as_str()), duration],
        )
        .await
    }

    pub async fn adjust_brightness(&self, action: AdjustAction) -> Result<bool> {
        self.acknowledged(
            "set_adjust",
            &[Param::from(action.as_str()), Param::from("bright")],
        )
        .await
    }

    /// Changes brightness by `percentage` (-100..=100) of the full range.
    pub async fn adjust_brightness_by(&self, percentage: i8, duration: Duration) -> Result<bool> {
        let percentage = check_percentage(percentage)?;
        let duration = check_duration(duration)?;
        self.acknowledged("adjust_bright", &[percentage, duration]).await
    }

    pub async fn brightness(&self) -> Result<u8> {
        let value = self.property("bright").await?;
        parse(Some(value.as_str()), "bright")?.ok_or(LightError::Unsupported("bright"))
    }

    /// Sets color temperature in Kelvin (1700..=6500).
    pub async fn set_color_temperature(
        &self,
        kelvin: u16,
        effect: Effect,
        duration: Duration,
    ) -> Result<bool> {
        let kelvin = check_color_temperature(kelvin)?;
        let duration = check_duration(duration)?;
        self.acknowledged("set_ct_abx", &[kelvin, Param::from(effect.as_str()), duration])
            .await
    }

    pub async fn adjust_color_temperature(&self, action: AdjustAction) -> Result<bool> {
        self.acknowledged(
            "set_adjust",
            &[Param::from(action.as_str()), Param::from("ct")],
        )
        .await
    }

    pub async fn adjust_color_temperature_by(
        &self,
        percentage: i8,
        duration: Duration,
    ) -> Result<bool> {
        let percentage = check_percentage(percentage)?;
        let duration = check_duration(duration)?;
        self.acknowledged("adjust_ct", &[percentage, duration]).await
    }

    pub async fn color_temperature(&self) -> Result<u16> {
        let value = self.property("ct").await?;
        parse(Some(value.as_str()), "ct")?.ok_or(LightError::Unsupported("ct"))
    }

    /// Persists the current settings as the power-on default.
    pub async fn set_default(&self) -> Result<bool> {
        self.acknowledged("set_default", &[]).await
    }

    pub async fn state(&self) -> Result<LightState> {
        let params: Vec<Param> = STATE_PROPERTIES.iter().map(|p| Param::from(*p)).collect();
        let values = self.client.invoke("get_prop", &params).await?;
        LightState::from_props(&values)
    }

    pub async fn close(&self) {
        self.client.close().await;
    }
}
