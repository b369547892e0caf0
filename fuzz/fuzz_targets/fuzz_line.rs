#![no_main]

use keyreg_bridge::config::LineBridgeConfig;
use keyreg_bridge::protocol::bridge::LineBridge;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Every inbound line must classify and render without panicking
    let bridge = LineBridge::new(LineBridgeConfig::default());
    let line = String::from_utf8_lossy(data);
    let outcome = bridge.handle_line(&line);
    let _ = outcome.operator_line();
});
