#![no_main]
use libfuzzer_sys::fuzz_target;
use shapejson::encode::write_json_string;
use shapejson::{decode_slice, DecodeOptions, EscapeMode, Value};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    for mode in [
        EscapeMode::Json,
        EscapeMode::HtmlSafe,
        EscapeMode::UnicodeSafe,
        EscapeMode::JavaScriptSafe,
    ] {
        let mut out = Vec::with_capacity(s.len() + 2);
        write_json_string(s, &mut out, mode).unwrap();

        // every mode must produce a literal that decodes back to the input
        let decoded = decode_slice(&out, DecodeOptions::default()).unwrap();
        assert_eq!(decoded, Value::Str(s.to_string()));
    }
});
