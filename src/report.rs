use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// Writes one command's diff to `out`: a header naming the command, the raw
/// diff bytes, then a blank separator line. Nothing is written for an empty
/// diff.
pub fn write_diff(out: &mut impl Write, label: &str, diff: &[u8]) -> io::Result<()> {
    if diff.is_empty() {
        return Ok(());
    }

    writeln!(out, "==> {} <==", label)?;
    out.write_all(diff)?;
    if !diff.ends_with(b"\n") {
        writeln!(out)?;
    }
    writeln!(out)
}

/// Renders an instant for log messages; the epoch means "never".
pub fn format_instant(instant: SystemTime) -> String {
    if instant == UNIX_EPOCH {
        return "never".to_string();
    }

    let datetime: chrono::DateTime<chrono::Local> = instant.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn render(label: &str, diff: &[u8]) -> String {
        let mut out = Vec::new();
        write_diff(&mut out, label, diff).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn empty_diff_writes_nothing() {
        assert_eq!(render("uptime", b""), "");
    }

    #[test]
    fn diff_gets_header_and_separator() {
        assert_eq!(
            render("sockets", b"-a\n+b\n"),
            "==> sockets <==\n-a\n+b\n\n"
        );
    }

    #[test]
    fn missing_trailing_newline_is_completed() {
        assert_eq!(render("x", b"+tail"), "==> x <==\n+tail\n\n");
    }

    #[test]
    fn epoch_renders_as_never() {
        assert_eq!(format_instant(UNIX_EPOCH), "never");
    }

    #[test]
    fn instant_renders_in_local_time() {
        let instant = UNIX_EPOCH + Duration::from_secs(1_704_067_200);
        let expected: chrono::DateTime<chrono::Local> = instant.into();

        assert_eq!(
            format_instant(instant),
            expected.format("%Y-%m-%d %H:%M:%S").to_string()
        );
    }
}
