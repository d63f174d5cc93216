#![no_main]
use libfuzzer_sys::fuzz_target;
use shapejson::{DecodeOptions, Decoder, Utf8Source};

fuzz_target!(|data: &[u8]| {
    // Wrap arbitrary bytes in quotes and run the escape-aware string reader.
    let mut buf = Vec::with_capacity(data.len() + 2);
    buf.push(b'"');
    buf.extend_from_slice(data);
    buf.push(b'"');

    if let Ok(src) = Utf8Source::new(&buf) {
        let mut de = Decoder::new(&src, DecodeOptions::default());
        let _ = de.read_string();
    }
});
