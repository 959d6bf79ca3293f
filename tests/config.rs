use core::time::Duration;
use dom_mirror::{config::Config, eligibility::can_inject};

#[test]
fn defaults() {
	let config = Config::default();
	assert_eq!(config.handshake_timeout(), Duration::from_secs(5));
	assert_eq!(config.render_interval(), Duration::from_millis(250));
	assert_eq!(config.stall_timeout(), Some(Duration::from_secs(5)));
	assert_eq!(config.popup_page, "popup/index.html");
	assert_eq!(config.listener_script, "listener.js");
}

#[test]
fn partial_overrides() {
	let config = Config::from_json(r#"{ "renderIntervalMs": 100, "stallTimeoutMs": null }"#).unwrap();
	assert_eq!(config.render_interval_ms, 100);
	assert_eq!(config.stall_timeout(), None);
	assert_eq!(config.handshake_timeout_ms, 5_000);
	assert_eq!(Config::from_json("{}").unwrap(), Config::default());
}

#[test]
fn rejects_wrong_types() {
	assert!(Config::from_json(r#"{ "renderIntervalMs": "fast" }"#).is_err());
	assert!(Config::from_json(r#"{ "handshakeTimeoutMs": -1 }"#).is_err());
}

#[test]
fn injection_eligibility() {
	assert!(can_inject("https://example.com/", false));
	assert!(can_inject("HTTP://EXAMPLE.COM/", false));
	assert!(!can_inject("file:///home/user/page.html", false));
	assert!(can_inject("file:///home/user/page.html", true));
	assert!(!can_inject("chrome://extensions/", true));
	assert!(!can_inject("chrome-extension://abc/popup/index.html", true));
	assert!(!can_inject("http", true));
	assert!(!can_inject("", true));
}
