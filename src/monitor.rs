// Terminal table of the 18 servo angles
//
// q / Esc quits.

use crossterm::{
    cursor::MoveTo,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode},
};
use std::io::{self, Write};
use std::time::Duration;

use crate::messages::AngleSnapshot;
use crate::robot::Channel;

pub const DEFAULT_REFRESH_HZ: f64 = 10.0;

/// Table text in `order`; raw mode needs explicit "\r\n" line ends
pub fn render_table(order: &[Channel], snapshot: Option<&AngleSnapshot>) -> String {
    let mut out = match snapshot {
        Some(s) => format!("Servo Angles (deg)  seq {}  t {:.3}s\r\n", s.seq, s.t),
        None => "Servo Angles (deg)  waiting for data...\r\n".to_string(),
    };
    out.push_str(&format!("{:>3}  {:<10} {:>7}\r\n", "Idx", "Name", "Angle"));

    for (i, channel) in order.iter().enumerate() {
        let name = channel.to_string();
        let value = snapshot
            .and_then(|s| s.angles.get(&name))
            .map(|v| format!("{:.1}", v))
            .unwrap_or_else(|| "--".to_string());
        out.push_str(&format!("{:>3}  {:<10} {:>7}\r\n", i, name, value));
    }
    out
}

/// Redraw every `period` with the newest snapshot from `source` until q/Esc
pub fn run<F>(period: Duration, order: &[Channel], source: F) -> io::Result<()>
where
    F: FnMut() -> Option<AngleSnapshot>,
{
    enable_raw_mode()?;
    let result = render_loop(period, order, source);
    disable_raw_mode()?;
    result
}

fn render_loop<F>(period: Duration, order: &[Channel], mut source: F) -> io::Result<()>
where
    F: FnMut() -> Option<AngleSnapshot>,
{
    let mut stdout = io::stdout();
    let mut last = None;

    loop {
        if let Some(snapshot) = source() {
            last = Some(snapshot);
        }
        execute!(stdout, MoveTo(0, 0), Clear(ClearType::All))?;
        stdout.write_all(render_table(order, last.as_ref()).as_bytes())?;
        stdout.flush()?;

        if event::poll(period)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                if pressed && matches!(code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
            }
        }
    }
    Ok(())
}
