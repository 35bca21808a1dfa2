//! SRT to WebVTT conversion.
//!
//! Works on raw bytes so subtitles in legacy single-byte encodings pass
//! through untouched apart from the structural rewrites.

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const VTT_HEADER: &[u8] = b"WEBVTT\n\n";
const TIMING_SEPARATOR: &[u8] = b"-->";

/// Converts SRT subtitle content to WebVTT.
///
/// Drops the numeric cue counters, rewrites timestamp decimal commas to dots
/// and prepends the `WEBVTT` header. Everything else is copied line by line.
pub fn srt_to_vtt(srt: &[u8]) -> Vec<u8> {
    let srt = srt.strip_prefix(UTF8_BOM).unwrap_or(srt);

    let mut out = Vec::with_capacity(VTT_HEADER.len() + srt.len());
    out.extend_from_slice(VTT_HEADER);

    let mut at_boundary = true;
    for line in lines(srt) {
        let trimmed = trim_line(line);

        if at_boundary && is_cue_counter(trimmed) {
            at_boundary = false;
            continue;
        }

        if contains(line, TIMING_SEPARATOR) {
            out.extend(line.iter().map(|&b| if b == b',' { b'.' } else { b }));
        } else {
            out.extend_from_slice(line);
        }
        out.push(b'\n');

        at_boundary = trimmed.is_empty();
    }

    out
}

/// Splits on `\n`, dropping a trailing `\r` from each line. A final empty
/// segment after the last newline is not a line.
fn lines(input: &[u8]) -> impl Iterator<Item = &[u8]> {
    let body = input.strip_suffix(b"\n").unwrap_or(input);
    let empty = input.is_empty();
    body.split(|&b| b == b'\n')
        .filter(move |_| !empty)
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}

/// Trims Unicode whitespace from UTF-8 lines and ASCII whitespace otherwise.
fn trim_line(line: &[u8]) -> &[u8] {
    match std::str::from_utf8(line) {
        Ok(text) => text.trim().as_bytes(),
        Err(_) => line.trim_ascii(),
    }
}

fn is_cue_counter(line: &[u8]) -> bool {
    !line.is_empty() && line.iter().all(u8::is_ascii_digit)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
