//! Interactive confirmation for `sc unblock`.

use std::io::{self, BufRead, Write};
use std::time::Duration;

/// Describes what an unblock applies to, e.g. `reddit.com, x.com` or
/// `all domains`.
pub fn unblock_target(domains: &[String]) -> String {
    if domains.is_empty() {
        "all domains".to_string()
    } else {
        domains.join(", ")
    }
}

/// Walks the user through every warning and a final confirmation.
///
/// Returns `Ok(false)` as soon as an answer is anything other than `y` or
/// `yes` (case-insensitive), including end of input.
pub fn confirm_unblock<R, W>(
    mut input: R,
    mut output: W,
    warnings: &[String],
    target: &str,
    duration: Duration,
) -> io::Result<bool>
where
    R: BufRead,
    W: Write,
{
    writeln!(output)?;
    for warning in warnings {
        if !ask(&mut input, &mut output, &format!("  {warning}"))? {
            writeln!(output, "Cancelled.")?;
            return Ok(false);
        }
    }

    let question = format!(
        "\n  Unblock {} for {}?",
        target,
        humantime::format_duration(duration)
    );
    if !ask(&mut input, &mut output, &question)? {
        writeln!(output, "Cancelled.")?;
        return Ok(false);
    }
    Ok(true)
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool> {
    write!(output, "{question} [y/N] ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn warnings() -> Vec<String> {
        vec!["First warning".to_string(), "Second warning".to_string()]
    }

    fn run(answers: &str, warnings: &[String]) -> (bool, String) {
        let mut output = Vec::new();
        let confirmed = confirm_unblock(
            Cursor::new(answers.as_bytes()),
            &mut output,
            warnings,
            "reddit.com",
            Duration::from_secs(15 * 60),
        )
        .unwrap();
        (confirmed, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_unblock_target() {
        assert_eq!(unblock_target(&[]), "all domains");
        assert_eq!(
            unblock_target(&["a.com".to_string(), "b.com".to_string()]),
            "a.com, b.com"
        );
    }

    #[test]
    fn test_all_yes_confirms() {
        let (confirmed, output) = run("y\nYES\ny\n", &warnings());
        assert!(confirmed);
        assert!(output.contains("  First warning [y/N] "));
        assert!(output.contains("  Second warning [y/N] "));
        assert!(output.contains("Unblock reddit.com for 15m? [y/N] "));
        assert!(!output.contains("Cancelled."));
    }

    #[test]
    fn test_no_on_warning_stops_early() {
        let (confirmed, output) = run("y\nn\ny\n", &warnings());
        assert!(!confirmed);
        assert!(output.contains("Cancelled."));
        assert!(!output.contains("Unblock reddit.com"));
    }

    #[test]
    fn test_empty_input_cancels() {
        let (confirmed, _) = run("", &warnings());
        assert!(!confirmed);
    }

    #[test]
    fn test_no_warnings_asks_final_question() {
        let (confirmed, output) = run("no\n", &[]);
        assert!(!confirmed);
        assert!(output.contains("Unblock reddit.com for 15m?"));
    }
}
