use std::io::{self, IsTerminal, Write};
use std::process::{Command, Stdio};

/// Print `output`, piping it through `$PAGER` when it would not fit on screen.
pub fn print_with_pager(output: &str) -> io::Result<()> {
    if !io::stdout().is_terminal() || fits_on_screen(output) {
        println!("{output}");
        return Ok(());
    }

    let pager = std::env::var("PAGER")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "less -FRX".into());
    let mut parts = pager.split_whitespace();
    let Some(program) = parts.next() else {
        println!("{output}");
        return Ok(());
    };

    let Ok(mut child) = Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .spawn()
    else {
        println!("{output}");
        return Ok(());
    };

    if let Some(mut stdin) = child.stdin.take() {
        // The pager may exit early (user pressed q); a broken pipe is fine.
        let _ = writeln!(stdin, "{output}");
    }
    child.wait()?;
    Ok(())
}

fn fits_on_screen(output: &str) -> bool {
    let (_, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    output.lines().count() < usize::from(rows)
}
