//! Creation flows offered by the dashboard's "create" page.
//!
//! Each flow is a static route handed to the host's router as an opaque string.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreationFlow {
    ShortLink,
    /// Dynamic QR whose target can change after printing.
    SmartQr,
    /// QR with the payload baked in.
    StaticQr,
}

impl CreationFlow {
    pub const ALL: [CreationFlow; 3] = [
        CreationFlow::ShortLink,
        CreationFlow::SmartQr,
        CreationFlow::StaticQr,
    ];

    pub fn route(self) -> &'static str {
        match self {
            CreationFlow::ShortLink => "/create/link",
            CreationFlow::SmartQr => "/create/smart-qr",
            CreationFlow::StaticQr => "/create/static-qr",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            CreationFlow::ShortLink => "Short link",
            CreationFlow::SmartQr => "Smart QR",
            CreationFlow::StaticQr => "Static QR",
        }
    }

    pub fn from_route(route: &str) -> Option<CreationFlow> {
        Self::ALL.into_iter().find(|flow| flow.route() == route)
    }

    /// `true` when the flow ends in a rendered QR code.
    pub fn renders_qr(self) -> bool {
        !matches!(self, CreationFlow::ShortLink)
    }
}

impl fmt::Display for CreationFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_are_distinct_and_resolvable() {
        for flow in CreationFlow::ALL {
            assert_eq!(CreationFlow::from_route(flow.route()), Some(flow));
        }
        assert_eq!(CreationFlow::from_route("/create/unknown"), None);
    }

    #[test]
    fn test_titles() {
        assert_eq!(CreationFlow::SmartQr.to_string(), "Smart QR");
        assert!(CreationFlow::StaticQr.renders_qr());
        assert!(!CreationFlow::ShortLink.renders_qr());
    }

    #[test]
    fn test_flow_id_json() {
        assert_eq!(serde_json::to_string(&CreationFlow::SmartQr).unwrap(), "\"smart-qr\"");
        let flow: CreationFlow = serde_json::from_str("\"static-qr\"").unwrap();
        assert_eq!(flow, CreationFlow::StaticQr);
        assert!(serde_json::from_str::<CreationFlow>("\"dynamic\"").is_err());
    }
}
