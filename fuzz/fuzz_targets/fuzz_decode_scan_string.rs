#![no_main]
use libfuzzer_sys::fuzz_target;
use shapejson::scan;

fn naive_stop_bytes(units: &[u8], start: usize) -> usize {
    (start..units.len())
        .find(|&i| units[i] == b'"' || units[i] == b'\\' || units[i] >= 0x80)
        .expect("terminator appended below")
}

fn naive_stop_wide(units: &[u16], start: usize) -> usize {
    // code units never stop on high values, only on the quote or backslash
    (start..units.len())
        .find(|&i| units[i] == b'"' as u16 || units[i] == b'\\' as u16)
        .expect("terminator appended below")
}

fuzz_target!(|data: &[u8]| {
    // The word scanner must agree with a scalar scan at every start offset.
    let mut buf = data.to_vec();
    buf.push(b'"'); // the scanner's caller contract: a terminator exists
    for start in 0..buf.len() {
        assert_eq!(
            scan::next_stop::<u8>(&buf, start, b'"'),
            naive_stop_bytes(&buf, start)
        );
    }

    // Pair adjacent bytes into code units to cover values >= 0x8000 too.
    let mut wide: Vec<u16> = data
        .chunks_exact(2)
        .map(|p| u16::from_le_bytes([p[0], p[1]]))
        .collect();
    wide.push(b'"' as u16);
    for start in 0..wide.len() {
        assert_eq!(
            scan::next_stop::<u16>(&wide, start, b'"'),
            naive_stop_wide(&wide, start)
        );
    }
});
