//! SDP line rewriting
//!
//! The transformations work on lines and keep every untouched line verbatim
//! and in order, terminator included. Documents are split on `\n`; each line
//! keeps its own `\r\n` or `\n`, so mixed line endings survive a rewrite.
//! Inserted lines take the terminator of the line they follow.

/// Bandwidth ceiling injected into video sections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthLimit {
    kbps: u32,
}

impl BandwidthLimit {
    /// Create a ceiling in kilobits per second
    pub const fn from_kbps(kbps: u32) -> Self {
        Self { kbps }
    }

    /// Ceiling in kilobits per second (`b=AS`)
    pub fn kbps(&self) -> u32 {
        self.kbps
    }

    /// Ceiling in bits per second (`b=TIAS`)
    pub fn bps(&self) -> u64 {
        u64::from(self.kbps) * 1000
    }

    fn attribute_lines(&self) -> [String; 2] {
        [format!("b=AS:{}", self.kbps), format!("b=TIAS:{}", self.bps())]
    }
}

impl Default for BandwidthLimit {
    fn default() -> Self {
        Self::from_kbps(800)
    }
}

/// Rewrites negotiated answers before they are committed
#[derive(Debug, Clone, Copy, Default)]
pub struct SdpTransformer {
    limit: BandwidthLimit,
}

impl SdpTransformer {
    pub fn new(limit: BandwidthLimit) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> BandwidthLimit {
        self.limit
    }

    /// Full answer rewrite: send-only direction, then bandwidth ceiling
    pub fn transform_answer(&self, sdp: &str) -> String {
        self.add_bandwidth_constraints(&force_send_only(sdp))
    }

    /// Insert `b=AS` and `b=TIAS` lines right after every `m=video` header
    ///
    /// Existing `b=AS`/`b=TIAS` lines inside a video section are replaced, so
    /// running this on its own output changes nothing.
    pub fn add_bandwidth_constraints(&self, sdp: &str) -> String {
        let lines = split_lines(sdp);
        let [as_line, tias_line] = self.limit.attribute_lines();
        let fallback_eol = if sdp.contains("\r\n") { "\r\n" } else { "\n" };

        let mut out: Vec<(&str, &str)> = Vec::with_capacity(lines.len() + 2);
        let mut in_video = false;

        for line in &lines {
            if line.text.starts_with("m=") {
                in_video = line.text.starts_with("m=video");
                if in_video {
                    let eol = if line.eol.is_empty() { fallback_eol } else { line.eol };
                    out.push((line.text, eol));
                    out.push((as_line.as_str(), eol));
                    out.push((tias_line.as_str(), eol));
                } else {
                    out.push((line.text, line.eol));
                }
                continue;
            }

            if in_video && is_bandwidth_ceiling(line.text) {
                continue;
            }
            out.push((line.text, line.eol));
        }

        // Trailing terminator matches the input
        if !sdp.ends_with('\n') {
            if let Some(last) = out.last_mut() {
                last.1 = "";
            }
        }

        join_lines(&out)
    }
}

/// Downgrade bidirectional media to send-only
///
/// Only lines that are exactly `a=sendrecv` change; every other line is
/// returned untouched.
pub fn force_send_only(sdp: &str) -> String {
    let out: Vec<(&str, &str)> = split_lines(sdp)
        .into_iter()
        .map(|line| {
            let text = if line.text == "a=sendrecv" { "a=sendonly" } else { line.text };
            (text, line.eol)
        })
        .collect();
    join_lines(&out)
}

fn is_bandwidth_ceiling(line: &str) -> bool {
    line.starts_with("b=AS:") || line.starts_with("b=TIAS:")
}

/// One SDP line and the terminator it carried (`""` on an unterminated last line)
struct SdpLine<'a> {
    text: &'a str,
    eol: &'a str,
}

fn split_lines(sdp: &str) -> Vec<SdpLine<'_>> {
    let mut lines = Vec::new();
    let mut rest = sdp;

    while !rest.is_empty() {
        let (line, tail) = match rest.find('\n') {
            Some(i) => rest.split_at(i + 1),
            None => (rest, ""),
        };
        let text = match line.strip_suffix('\n') {
            Some(l) => l.strip_suffix('\r').unwrap_or(l),
            None => line,
        };
        lines.push(SdpLine {
            text,
            eol: &line[text.len()..],
        });
        rest = tail;
    }

    lines
}

fn join_lines(lines: &[(&str, &str)]) -> String {
    let len = lines.iter().map(|(text, eol)| text.len() + eol.len()).sum();
    let mut out = String::with_capacity(len);
    for (text, eol) in lines {
        out.push_str(text);
        out.push_str(eol);
    }
    out
}
