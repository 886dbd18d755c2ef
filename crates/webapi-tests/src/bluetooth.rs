//! Bluetooth (`navigator.mozBluetooth`) helpers.

use crate::result::{WebApiError, WebApiResult};
use crate::session::ScriptSession;
use crate::signal::{is_truthy, OutcomeFlags, RemoteGateway, RemoteOperation, RECEIVED_ERROR};
use crate::wait::Clock;
use serde_json::{json, Value};
use tracing::info;

/// Flag set by the `enabled` event handler
pub const ENABLED_EVENT_FLAG: &str = "rcvd_enabled_event";

/// Flag set by the `disabled` event handler
pub const DISABLED_EVENT_FLAG: &str = "rcvd_disabled_event";

/// Flag holding the default adapter once found
pub const ADAPTER_FLAG: &str = "bluetooth_adapter";

/// Flag holding the adapter's timeout after a successful set
pub const DISCOVERABLE_TIMEOUT_FLAG: &str = "discoverable_timeout";

const IS_ENABLED_SCRIPT: &str = "return window.navigator.mozBluetooth.enabled;";

const SET_ENABLED_SCRIPT: &str = r#"
var enable = arguments[0];
var finish = arguments[arguments.length - 1];
var mozBt = window.navigator.mozBluetooth;

mozBt.onenabled = function() {
    console.log("Received mozBluetooth.onenabled event");
    ns.rcvd_enabled_event = true;
};

mozBt.ondisabled = function() {
    console.log("Received mozBluetooth.ondisabled event");
    ns.rcvd_disabled_event = true;
};

console.log(enable ? "Turning on bluetooth via settings" : "Turning off bluetooth via settings");
var lock = window.navigator.mozSettings.createLock();
var result = lock.set({ 'bluetooth.enabled': enable });

result.onerror = function() {
    console.log("Failed to change the bluetooth.enabled setting");
    ns.rcvd_error = true;
};
finish(1);
"#;

const GET_DEFAULT_ADAPTER_SCRIPT: &str = r#"
var finish = arguments[arguments.length - 1];
ns.bluetooth_adapter = null;

console.log("Getting default bluetooth adapter");
var request = window.navigator.mozBluetooth.getDefaultAdapter();

request.onsuccess = function() {
    console.log("mozBluetooth.getDefaultAdapter request success");
    ns.bluetooth_adapter = request.result;
    ns.rcvd_success = true;
};

request.onerror = function() {
    console.log("mozBluetooth.getDefaultAdapter request returned error");
    ns.rcvd_error = true;
};
finish(1);
"#;

const SET_DISCOVERABLE_TIMEOUT_SCRIPT: &str = r#"
var timeout = arguments[0];
var finish = arguments[arguments.length - 1];
ns.discoverable_timeout = null;
var adapter = ns.bluetooth_adapter;

console.log("Setting bluetooth discoverable timeout to " + timeout);
var request = adapter.setDiscoverableTimeout(timeout);

request.onsuccess = function() {
    console.log("BluetoothAdapter.setDiscoverableTimeout request success");
    ns.discoverable_timeout = adapter.discoverableTimeout;
    ns.rcvd_success = true;
};

request.onerror = function() {
    console.log("BluetoothAdapter.setDiscoverableTimeout returned error");
    ns.rcvd_error = true;
};
finish(1);
"#;

const GET_DISCOVERABLE_TIMEOUT_SCRIPT: &str =
    "return ns.bluetooth_adapter ? ns.bluetooth_adapter.discoverableTimeout : null;";

/// Bluetooth operations over a gateway
#[derive(Debug)]
pub struct Bluetooth<'g, S: ScriptSession, C: Clock> {
    gateway: &'g mut RemoteGateway<S, C>,
}

impl<'g, S: ScriptSession, C: Clock> Bluetooth<'g, S, C> {
    /// Wrap a gateway
    pub fn new(gateway: &'g mut RemoteGateway<S, C>) -> Self {
        Self { gateway }
    }

    /// Whether the adapter reports itself enabled
    pub fn is_enabled(&mut self) -> WebApiResult<bool> {
        let value = self
            .gateway
            .session_mut()
            .execute_script(IS_ENABLED_SCRIPT, &[])?;
        Ok(is_truthy(&value))
    }

    /// Toggle `bluetooth.enabled` through a settings lock and wait for the
    /// matching `enabled` / `disabled` event
    pub fn set_enabled(&mut self, enable: bool) -> WebApiResult<()> {
        let (name, success) = if enable {
            ("enable bluetooth via mozSettings", ENABLED_EVENT_FLAG)
        } else {
            ("disable bluetooth via mozSettings", DISABLED_EVENT_FLAG)
        };
        let op = RemoteOperation::with_flags(name, OutcomeFlags::new(success, RECEIVED_ERROR));
        self.gateway
            .perform(&op, SET_ENABLED_SCRIPT, &[json!(enable)])?;
        info!(enable, "bluetooth enabled setting changed");
        Ok(())
    }

    /// Fetch the default adapter; it stays available to later calls
    pub fn default_adapter(&mut self) -> WebApiResult<Value> {
        let op = RemoteOperation::new("mozBluetooth.getDefaultAdapter");
        self.gateway.perform(&op, GET_DEFAULT_ADAPTER_SCRIPT, &[])?;

        let adapter = self.gateway.read_flag(ADAPTER_FLAG)?;
        if adapter.is_null() {
            return Err(WebApiError::assertion(
                "mozBluetooth.getDefaultAdapter returned none",
            ));
        }
        Ok(adapter)
    }

    /// Discoverable timeout of the adapter found by
    /// [`default_adapter`](Self::default_adapter)
    pub fn discoverable_timeout(&mut self) -> WebApiResult<Option<u64>> {
        let value = self
            .gateway
            .execute_bound(GET_DISCOVERABLE_TIMEOUT_SCRIPT, &[])?;
        Ok(value.as_u64())
    }

    /// Set the discoverable timeout and check the adapter reports it back
    pub fn set_discoverable_timeout(&mut self, seconds: u64) -> WebApiResult<()> {
        let op = RemoteOperation::new("BluetoothAdapter.setDiscoverableTimeout");
        self.gateway
            .perform(&op, SET_DISCOVERABLE_TIMEOUT_SCRIPT, &[json!(seconds)])?;

        let reported = self.gateway.read_flag(DISCOVERABLE_TIMEOUT_FLAG)?;
        if reported.as_u64() != Some(seconds) {
            return Err(WebApiError::assertion(format!(
                "BluetoothAdapter.discoverableTimeout value was not set correctly \
                 (expected {seconds}, got {reported})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::session::{ExecutionMode, FlagUpdate, MockSession};
    use crate::signal::{FlagNamespace, RECEIVED_SUCCESS};
    use crate::wait::{ManualClock, Wait, WaitOptions};

    fn gateway(session: MockSession) -> RemoteGateway<MockSession, ManualClock> {
        RemoteGateway::with_wait(
            session,
            FlagNamespace::default(),
            Wait::with_clock(
                WaitOptions::new().with_timeout(1_000).with_poll_interval(250),
                ManualClock::new(),
            ),
        )
    }

    #[test]
    fn test_is_enabled_reads_property() {
        let mut session = MockSession::new();
        session.push_sync_result(true);
        let mut gw = gateway(session);
        assert!(Bluetooth::new(&mut gw).is_enabled().unwrap());
        assert!(gw.session().was_called("mozBluetooth.enabled"));
    }

    #[test]
    fn test_enable_waits_for_enabled_event() {
        let mut session = MockSession::new();
        session.plan_async(vec![FlagUpdate::now(ENABLED_EVENT_FLAG, true).after_reads(2)]);
        let mut gw = gateway(session);
        Bluetooth::new(&mut gw).set_enabled(true).unwrap();

        let submitted = &gw.session().history()[0];
        assert_eq!(submitted.mode, ExecutionMode::Async);
        assert_eq!(submitted.args, vec![json!(true)]);
        assert!(submitted.source.contains("bluetooth.enabled"));
        assert!(submitted
            .source
            .contains("window.wrappedJSObject.rcvd_enabled_event = false;"));
    }

    #[test]
    fn test_disable_ignores_enabled_event() {
        let mut session = MockSession::new();
        session.plan_async(vec![FlagUpdate::now(ENABLED_EVENT_FLAG, true)]);
        let mut gw = gateway(session);
        let err = Bluetooth::new(&mut gw).set_enabled(false).unwrap_err();
        assert!(err.to_string().contains("disable bluetooth via mozSettings"));
        assert!(err.to_string().contains("no response"));
    }

    #[test]
    fn test_settings_error_is_reported() {
        let mut session = MockSession::new();
        session.plan_async(vec![FlagUpdate::now(RECEIVED_ERROR, true)]);
        let mut gw = gateway(session);
        let err = Bluetooth::new(&mut gw).set_enabled(true).unwrap_err();
        assert!(matches!(err, WebApiError::RemoteOperation { .. }));
        assert!(err.to_string().contains("error received"));
    }

    #[test]
    fn test_default_adapter_returned() {
        let mut session = MockSession::new();
        session.plan_async(vec![
            FlagUpdate::now(ADAPTER_FLAG, json!({"name": "Firefox OS", "discoverable": false})),
            FlagUpdate::now(RECEIVED_SUCCESS, true).after_reads(1),
        ]);
        let mut gw = gateway(session);
        let adapter = Bluetooth::new(&mut gw).default_adapter().unwrap();
        assert_eq!(adapter["name"], "Firefox OS");
    }

    #[test]
    fn test_null_adapter_is_assertion_failure() {
        let mut session = MockSession::new();
        session.plan_async(vec![FlagUpdate::now(RECEIVED_SUCCESS, true)]);
        let mut gw = gateway(session);
        let err = Bluetooth::new(&mut gw).default_adapter().unwrap_err();
        assert!(matches!(err, WebApiError::AssertionFailed { .. }));
        assert!(err.to_string().contains("returned none"));
    }

    #[test]
    fn test_default_adapter_error() {
        let mut session = MockSession::new();
        session.plan_async(vec![FlagUpdate::now(RECEIVED_ERROR, true)]);
        let mut gw = gateway(session);
        let err = Bluetooth::new(&mut gw).default_adapter().unwrap_err();
        assert_eq!(
            err.to_string(),
            "mozBluetooth.getDefaultAdapter failed: error received"
        );
    }

    #[test]
    fn test_set_discoverable_timeout_passes_requested_value() {
        let mut session = MockSession::new();
        session.plan_async(vec![
            FlagUpdate::now(RECEIVED_SUCCESS, true),
            FlagUpdate::now(DISCOVERABLE_TIMEOUT_FLAG, 42),
        ]);
        let mut gw = gateway(session);
        Bluetooth::new(&mut gw).set_discoverable_timeout(42).unwrap();
        assert_eq!(gw.session().history()[0].args, vec![json!(42)]);
    }

    #[test]
    fn test_set_discoverable_timeout_mismatch() {
        let mut session = MockSession::new();
        session.plan_async(vec![
            FlagUpdate::now(RECEIVED_SUCCESS, true),
            FlagUpdate::now(DISCOVERABLE_TIMEOUT_FLAG, 10),
        ]);
        let mut gw = gateway(session);
        let err = Bluetooth::new(&mut gw).set_discoverable_timeout(42).unwrap_err();
        assert!(matches!(err, WebApiError::AssertionFailed { .. }));
        assert!(err.to_string().contains("expected 42, got 10"));
    }

    #[test]
    fn test_discoverable_timeout_getter() {
        let mut session = MockSession::new();
        session.push_sync_result(120);
        let mut gw = gateway(session);
        assert_eq!(
            Bluetooth::new(&mut gw).discoverable_timeout().unwrap(),
            Some(120)
        );
        assert!(gw.session().history()[0]
            .source
            .contains("discoverableTimeout"));
    }
}
