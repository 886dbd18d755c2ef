//! Desktop-style `Notification` helpers.

use crate::result::{WebApiError, WebApiResult};
use crate::session::ScriptSession;
use crate::signal::{RemoteGateway, RemoteOperation};
use crate::wait::Clock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

/// Flag holding the permission string once the request resolves
pub const PERMISSION_FLAG: &str = "notification_permission";

const REQUEST_PERMISSION_SCRIPT: &str = r#"
var finish = arguments[arguments.length - 1];
ns.notification_permission = null;

console.log("Requesting notification permission");
window.Notification.requestPermission(function(result) {
    console.log("Notification permission: " + result);
    ns.notification_permission = result;
    ns.rcvd_success = true;
});
finish(1);
"#;

const CREATE_NOTIFICATION_SCRIPT: &str = r#"
var title = arguments[0];
var body = arguments[1];
var finish = arguments[arguments.length - 1];

console.log("Creating notification: " + title);
var notification = new window.Notification(title, { body: body });

notification.onshow = function() {
    console.log("Notification shown");
    ns.rcvd_success = true;
};

notification.onerror = function() {
    console.log("Notification returned error");
    ns.rcvd_error = true;
};
finish(1);
"#;

/// Result of `Notification.requestPermission`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    /// The user allowed notifications
    Granted,
    /// The user refused notifications
    Denied,
    /// The user dismissed the request
    Default,
}

impl NotificationPermission {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Default => "default",
        }
    }

    /// Parse the wire name
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "granted" => Some(Self::Granted),
            "denied" => Some(Self::Denied),
            "default" => Some(Self::Default),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification operations over a gateway
#[derive(Debug)]
pub struct Notifications<'g, S: ScriptSession, C: Clock> {
    gateway: &'g mut RemoteGateway<S, C>,
}

impl<'g, S: ScriptSession, C: Clock> Notifications<'g, S, C> {
    /// Wrap a gateway
    pub fn new(gateway: &'g mut RemoteGateway<S, C>) -> Self {
        Self { gateway }
    }

    /// Ask the user for notification permission
    pub fn request_permission(&mut self) -> WebApiResult<NotificationPermission> {
        let op = RemoteOperation::new("Notification.requestPermission");
        self.gateway.perform(&op, REQUEST_PERMISSION_SCRIPT, &[])?;

        let value = self.gateway.read_flag(PERMISSION_FLAG)?;
        let permission = value
            .as_str()
            .and_then(NotificationPermission::parse)
            .ok_or_else(|| {
                WebApiError::assertion(format!(
                    "Notification.requestPermission returned unexpected value {value}"
                ))
            })?;
        info!(%permission, "notification permission resolved");
        Ok(permission)
    }

    /// Create a notification and wait until the device shows it
    pub fn create(&mut self, title: &str, body: &str) -> WebApiResult<()> {
        let op = RemoteOperation::new("Notification creation");
        self.gateway
            .perform(&op, CREATE_NOTIFICATION_SCRIPT, &[json!(title), json!(body)])?;
        Ok(())
    }
}
