#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Inbound frames arrive as text; anything that is not UTF-8 never reaches
    // the decoder.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(elements) = piano_room_client::codec::decode_frame(s) {
            for inbound in elements.into_iter().flatten() {
                let _ = inbound.opcode();
                let _ = inbound.bypasses_queue();
            }
        }
    }
});
