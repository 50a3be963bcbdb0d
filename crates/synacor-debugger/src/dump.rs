//! Hex and word dump renderers for memory/register/stack inspection.

/// Renders `data[start..stop]` as `columns`-wide rows of hex bytes with an
/// ASCII gutter — the raw-byte form used for on-disk memory dumps.
#[must_use]
pub fn hexdump(data: &[u8], start: usize, stop: usize, columns: usize) -> String {
    let stop = stop.min(data.len());
    let mut lines = Vec::new();
    let mut row = start;
    while row < stop {
        let end = (row + columns).min(stop);
        let slice = &data[row..end];
        let hex = slice.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ");
        let pad = "   ".repeat(columns - slice.len());
        let ascii: String = slice
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        lines.push(format!("{row:04x}: {hex}{pad}  {ascii}"));
        row += columns;
    }
    lines.join("\n")
}

/// Renders `data[start..stop]` as `columns`-wide rows of 15-bit unsigned
/// words with an ASCII gutter from each word's low byte — the form used
/// for memory, register, and stack inspection (`mem`/`regs`/`stack`).
#[must_use]
pub fn mem_dump(data: &[i16], start: usize, stop: usize, columns: usize) -> String {
    let stop = stop.min(data.len());
    let mut lines = Vec::new();
    let mut row = start;
    while row < stop {
        let end = (row + columns).min(stop);
        let slice = &data[row..end];
        let hex = slice
            .iter()
            .map(|&w| format!("{:04x}", w as u16))
            .collect::<Vec<_>>()
            .join(" ");
        let pad = "     ".repeat(columns - slice.len());
        let ascii: String = slice
            .iter()
            .map(|&w| {
                let b = w as u16;
                if (32..127).contains(&b) {
                    char::from_u32(u32::from(b)).unwrap_or('.')
                } else {
                    '.'
                }
            })
            .collect();
        lines.push(format!("{row:04x}: {hex}{pad}  {ascii}"));
        row += columns;
    }
    lines.join("\n")
}
