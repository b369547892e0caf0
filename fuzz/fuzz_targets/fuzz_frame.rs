#![no_main]

use keyreg_bridge::core::encoding::decode_frame;
use keyreg_bridge::protocol::message::interpret;
use keyreg_bridge::protocol::verifier::verify;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decode, interpret and verify arbitrary frames - errors are fine, panics are not
    if let Ok(frame) = decode_frame(data.to_vec()) {
        if let Ok(registration) = interpret(frame.value) {
            let _ = verify(data, &registration);
        }
    }
});
