#![no_main]
use libfuzzer_sys::fuzz_target;
use shapejson::{decode_slice, decode_units, DecodeOptions};

fuzz_target!(|data: &[u8]| {
    // Exercise the full decode path: whitespace skip, key matching, string
    // scan, number scan, structural skipping, error reporting. Errors are
    // fine; panics are not.
    let _ = decode_slice(data, DecodeOptions::default());

    let lax = DecodeOptions {
        allow_comments: true,
        allow_single_quotes: true,
        allow_unquoted_keys: true,
        allow_trailing_commas: true,
        ..DecodeOptions::default()
    };
    let _ = decode_slice(data, lax);

    // Same input as 16-bit code units drives the wide scan path.
    let units: Vec<u16> = data.iter().map(|&b| b as u16).collect();
    let _ = decode_units(&units, DecodeOptions::default());
});
