//! The conformance cases.
//!
//! Each case is a plain function over a [`CaseContext`]. Cases that need a
//! human ask through the context's [`Prompter`]; everything else goes
//! through the gateway.

use crate::bluetooth::Bluetooth;
use crate::notification::{NotificationPermission, Notifications};
use crate::result::{WebApiError, WebApiResult};
use crate::semiauto::Prompter;
use crate::sensors::{SensorKind, SensorListener};
use crate::session::ScriptSession;
use crate::signal::RemoteGateway;
use crate::wait::Clock;
use tracing::info;

/// Discoverable timeout requested by `bluetooth_discoverable_timeout`
pub const DISCOVERABLE_TIMEOUT_SECS: u64 = 10;

/// Text of the notification created by `notification_simple`
pub const NOTIFICATION_TEXT: &str = "Hello from Firefox OS";

/// Names of every case, in run order
pub const CASE_NAMES: [&str; 5] = [
    "bluetooth_enable_disable",
    "bluetooth_discoverable_timeout",
    "notification_simple",
    "proximity_change",
    "ambient_light_change",
];

/// What a case runs against
#[derive(Debug)]
pub struct CaseContext<S: ScriptSession, C: Clock, P: Prompter> {
    /// Remote page access
    pub gateway: RemoteGateway<S, C>,
    /// Operator access
    pub prompter: P,
}

impl<S: ScriptSession, C: Clock, P: Prompter> CaseContext<S, C, P> {
    /// Bundle a gateway and a prompter
    pub const fn new(gateway: RemoteGateway<S, C>, prompter: P) -> Self {
        Self { gateway, prompter }
    }
}

/// Body or teardown of a case
pub type CaseFn<S, C, P> = fn(&mut CaseContext<S, C, P>) -> WebApiResult<()>;

/// A named case
pub struct Case<S: ScriptSession, C: Clock, P: Prompter> {
    /// Case name
    pub name: &'static str,
    /// One-line summary
    pub description: &'static str,
    /// Case body
    pub run: CaseFn<S, C, P>,
    /// Runs after the body whatever its outcome
    pub teardown: Option<CaseFn<S, C, P>>,
}

impl<S: ScriptSession, C: Clock, P: Prompter> std::fmt::Debug for Case<S, C, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Case")
            .field("name", &self.name)
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

/// Every case, in run order
#[must_use]
pub fn registry<S: ScriptSession, C: Clock, P: Prompter>() -> Vec<Case<S, C, P>> {
    vec![
        Case {
            name: CASE_NAMES[0],
            description: "Turn Bluetooth on and off through the settings API",
            run: bluetooth_enable_disable,
            teardown: None,
        },
        Case {
            name: CASE_NAMES[1],
            description: "Set the default adapter's discoverable timeout",
            run: bluetooth_discoverable_timeout,
            teardown: None,
        },
        Case {
            name: CASE_NAMES[2],
            description: "Show a notification and have the operator confirm it",
            run: notification_simple,
            teardown: None,
        },
        Case {
            name: CASE_NAMES[3],
            description: "Record deviceproximity events while the operator covers the sensor",
            run: proximity_change,
            teardown: Some(remove_proximity_listener),
        },
        Case {
            name: CASE_NAMES[4],
            description: "Record devicelight events while the operator covers the sensor",
            run: ambient_light_change,
            teardown: Some(remove_light_listener),
        },
    ]
}

/// Toggle Bluetooth on then off and check the adapter follows
pub fn bluetooth_enable_disable<S: ScriptSession, C: Clock, P: Prompter>(
    ctx: &mut CaseContext<S, C, P>,
) -> WebApiResult<()> {
    let mut bt = Bluetooth::new(&mut ctx.gateway);
    if bt.is_enabled()? {
        info!("bluetooth already on, turning it off first");
        bt.set_enabled(false)?;
    }

    bt.set_enabled(true)?;
    if !bt.is_enabled()? {
        return Err(WebApiError::assertion(
            "mozBluetooth.enabled is false after the enabled event",
        ));
    }
    ctx.prompter.confirm(
        "Bluetooth has been turned on. Does the device's status bar show the Bluetooth icon?",
    )?;

    let mut bt = Bluetooth::new(&mut ctx.gateway);
    bt.set_enabled(false)?;
    if bt.is_enabled()? {
        return Err(WebApiError::assertion(
            "mozBluetooth.enabled is true after the disabled event",
        ));
    }
    Ok(())
}

/// Set the discoverable timeout on the default adapter
pub fn bluetooth_discoverable_timeout<S: ScriptSession, C: Clock, P: Prompter>(
    ctx: &mut CaseContext<S, C, P>,
) -> WebApiResult<()> {
    let mut bt = Bluetooth::new(&mut ctx.gateway);
    if !bt.is_enabled()? {
        bt.set_enabled(true)?;
    }
    bt.default_adapter()?;
    let before = bt.discoverable_timeout()?;
    info!(?before, requested = DISCOVERABLE_TIMEOUT_SECS, "setting discoverable timeout");
    bt.set_discoverable_timeout(DISCOVERABLE_TIMEOUT_SECS)
}

/// Create a notification and ask the operator whether it showed up
pub fn notification_simple<S: ScriptSession, C: Clock, P: Prompter>(
    ctx: &mut CaseContext<S, C, P>,
) -> WebApiResult<()> {
    let permission = Notifications::new(&mut ctx.gateway).request_permission()?;
    if permission != NotificationPermission::Granted {
        return Err(WebApiError::assertion(format!(
            "User must grant permission on device for notifications (got {permission})"
        )));
    }

    ctx.prompter.instruct(
        "About to create a new device notification. Please watch the device's \
         notification ribbon at the top of the screen.",
    )?;
    Notifications::new(&mut ctx.gateway).create(NOTIFICATION_TEXT, "")?;
    ctx.prompter.confirm(&format!(
        "A new notification (with the text '{NOTIFICATION_TEXT}') should appear on the \
         device's notification ribbon. Did the notification appear and contain the correct text?"
    ))
}

/// Record proximity events while the operator waves over the sensor
pub fn proximity_change<S: ScriptSession, C: Clock, P: Prompter>(
    ctx: &mut CaseContext<S, C, P>,
) -> WebApiResult<()> {
    record_sensor(
        ctx,
        SensorKind::Proximity,
        "Ensure the phone is unlocked and held in your hand, perpendicular to the floor",
        "Move your hand in front of the phone and hit OK when the screen darkens",
    )
}

/// Record light level events while the operator shades the sensor
pub fn ambient_light_change<S: ScriptSession, C: Clock, P: Prompter>(
    ctx: &mut CaseContext<S, C, P>,
) -> WebApiResult<()> {
    record_sensor(
        ctx,
        SensorKind::AmbientLight,
        "Ensure the phone is unlocked and facing a light source",
        "Cover the top of the phone with your hand, then uncover it and hit OK",
    )
}

fn record_sensor<S: ScriptSession, C: Clock, P: Prompter>(
    ctx: &mut CaseContext<S, C, P>,
    kind: SensorKind,
    setup: &str,
    action: &str,
) -> WebApiResult<()> {
    ctx.prompter.instruct(setup)?;
    SensorListener::new(&mut ctx.gateway, kind).install()?;
    ctx.prompter.instruct(action)?;

    let readings = SensorListener::new(&mut ctx.gateway, kind).readings()?;
    info!(sensor = %kind, events = readings.len(), "sensor events recorded");
    if readings.is_empty() {
        return Err(WebApiError::assertion(format!("no {kind} events were received")));
    }
    Ok(())
}

fn remove_proximity_listener<S: ScriptSession, C: Clock, P: Prompter>(
    ctx: &mut CaseContext<S, C, P>,
) -> WebApiResult<()> {
    SensorListener::new(&mut ctx.gateway, SensorKind::Proximity).remove()
}

fn remove_light_listener<S: ScriptSession, C: Clock, P: Prompter>(
    ctx: &mut CaseContext<S, C, P>,
) -> WebApiResult<()> {
    SensorListener::new(&mut ctx.gateway, SensorKind::AmbientLight).remove()
}
