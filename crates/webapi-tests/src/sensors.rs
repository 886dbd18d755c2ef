//! Ambient light and proximity sensor listeners.
//!
//! Sensor events arrive whenever the hardware reports, so instead of a
//! success flag the installed listener appends every event to an array
//! in the flag namespace. The host reads the array after the human has
//! performed the requested action.

use crate::result::WebApiResult;
use crate::session::ScriptSession;
use crate::signal::RemoteGateway;
use crate::wait::Clock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

const INSTALL_SCRIPT: &str = r#"
var eventName = arguments[0];
var store = arguments[1];
var handler = arguments[2];
if (ns[handler]) {
    window.removeEventListener(eventName, ns[handler]);
}
ns[store] = [];
ns[handler] = function(event) {
    console.log(eventName + " event: " + event.value);
    ns[store].push({
        value: event.value === undefined ? null : event.value,
        min: event.min === undefined ? null : event.min,
        max: event.max === undefined ? null : event.max,
        near: event.near === undefined ? null : event.near
    });
};
window.addEventListener(eventName, ns[handler]);
"#;

const REMOVE_SCRIPT: &str = r"
var eventName = arguments[0];
var handler = arguments[1];
if (ns[handler]) {
    window.removeEventListener(eventName, ns[handler]);
    ns[handler] = null;
}
";

/// Device sensor event families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    /// `devicelight`: ambient light level in lux
    AmbientLight,
    /// `deviceproximity`: distance to the nearest object in cm
    Proximity,
    /// `userproximity`: whether something is near the screen
    UserProximity,
}

impl SensorKind {
    /// DOM event name
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::AmbientLight => "devicelight",
            Self::Proximity => "deviceproximity",
            Self::UserProximity => "userproximity",
        }
    }

    /// Flag holding recorded readings
    #[must_use]
    pub fn readings_flag(&self) -> String {
        format!("{}_readings", self.event_name())
    }

    /// Flag holding the installed handler
    #[must_use]
    pub fn handler_flag(&self) -> String {
        format!("{}_handler", self.event_name())
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

/// One recorded sensor event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorReading {
    /// Measured value (`devicelight`, `deviceproximity`)
    pub value: Option<f64>,
    /// Lower bound of the sensor range
    pub min: Option<f64>,
    /// Upper bound of the sensor range
    pub max: Option<f64>,
    /// Nearness (`userproximity`)
    pub near: Option<bool>,
}

/// Records sensor events into the flag namespace
#[derive(Debug)]
pub struct SensorListener<'g, S: ScriptSession, C: Clock> {
    gateway: &'g mut RemoteGateway<S, C>,
    kind: SensorKind,
}

impl<'g, S: ScriptSession, C: Clock> SensorListener<'g, S, C> {
    /// Listener for one sensor kind
    pub fn new(gateway: &'g mut RemoteGateway<S, C>, kind: SensorKind) -> Self {
        Self { gateway, kind }
    }

    /// Sensor kind this listener records
    pub const fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Install the listener, discarding earlier readings
    pub fn install(&mut self) -> WebApiResult<()> {
        self.gateway.execute_bound(
            INSTALL_SCRIPT,
            &[
                json!(self.kind.event_name()),
                json!(self.kind.readings_flag()),
                json!(self.kind.handler_flag()),
            ],
        )?;
        debug!(sensor = %self.kind, "sensor listener installed");
        Ok(())
    }

    /// Readings recorded since [`install`](Self::install)
    pub fn readings(&mut self) -> WebApiResult<Vec<SensorReading>> {
        let value = self.gateway.read_flag(&self.kind.readings_flag())?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value::<Vec<SensorReading>>(value)?)
    }

    /// Remove the listener
    pub fn remove(&mut self) -> WebApiResult<()> {
        let args: [Value; 2] = [
            json!(self.kind.event_name()),
            json!(self.kind.handler_flag()),
        ];
        self.gateway.execute_bound(REMOVE_SCRIPT, &args)?;
        debug!(sensor = %self.kind, "sensor listener removed");
        Ok(())
    }
}
