use embedded_graphics::prelude::{Point, Size};
use panel_hal::{DiskUsage, Frame, MemoryUsage, NetworkIdentity, Reading};

use super::text::{COLUMNS, center, draw_bar, draw_footer, draw_header, draw_large, draw_text, split_by_n};

/// Wrapped error lines shown per screen.
pub const ERROR_LINES_PER_SCREEN: usize = 3;
const ERROR_LINE_HEIGHT: i32 = 16;

pub fn sensor(reading: &Reading) -> Frame {
    let mut frame = Frame::new();
    draw_header(&mut frame, "Temp / Hum");
    draw_large(&mut frame, 0, 4, &format!("{:.0}", reading.temperature_c), 3);
    draw_large(&mut frame, 42, 16, "o", 1);
    draw_large(&mut frame, 25, 9, "C", 2);
    draw_large(&mut frame, 24, 6, &format!("{:.0}", reading.humidity), 3);
    draw_large(&mut frame, 58, 14, "%", 2);
    draw_footer(&mut frame);
    frame
}

pub fn network(identity: &NetworkIdentity) -> Frame {
    let mut frame = Frame::new();
    draw_header(&mut frame, &identity.hostname);
    let (head, tail) = split_address(&identity.address);
    draw_large(&mut frame, 0, 6, head, 2);
    if !tail.is_empty() {
        draw_large(&mut frame, 15, 17, &format!("{tail:>7}"), 2);
    }
    draw_footer(&mut frame);
    frame
}

pub fn cpu_usage(percent: f64) -> Frame {
    let mut frame = Frame::new();
    draw_header(&mut frame, "CPU Usage");
    draw_large(&mut frame, 2, 5, &format!("{percent:5.1}"), 3);
    draw_large(&mut frame, 58, 14, "%", 2);
    draw_footer(&mut frame);
    frame
}

pub fn cpu_temperature(celsius: f64) -> Frame {
    let mut frame = Frame::new();
    draw_header(&mut frame, "CPU Temperature");
    draw_large(&mut frame, 0, 5, &format!("{celsius:.2}"), 3);
    draw_text(&mut frame, 106, 18, "o");
    draw_large(&mut frame, 58, 10, "C", 2);
    draw_footer(&mut frame);
    frame
}

pub fn memory(usage: &MemoryUsage) -> Frame {
    let mut frame = Frame::new();
    draw_header(&mut frame, "RAM Usage");
    draw_bar(&mut frame, Point::new(0, 22), Size::new(128, 14), usage.percent);
    draw_large(&mut frame, 0, 17, &format!("{:5.2}", usage.used), 2);
    draw_text(&mut frame, 74, 44, "/");
    draw_large(&mut frame, 42, 17, &format!("{:2.0}", usage.total), 2);
    draw_text(&mut frame, 114, 48, "GB");
    draw_footer(&mut frame);
    frame
}

pub fn disk(usage: &DiskUsage) -> Frame {
    let mut frame = Frame::new();
    draw_header(&mut frame, "Disk Used / Total");
    draw_large(&mut frame, 6, 6, &format!("{:7.2}", usage.used), 2);
    draw_text(&mut frame, 112, 25, "GB");
    draw_large(&mut frame, 6, 17, &format!("{:7.2}", usage.total), 2);
    draw_text(&mut frame, 112, 48, "GB");
    draw_footer(&mut frame);
    frame
}

/// One screen per [`ERROR_LINES_PER_SCREEN`] wrapped lines of `message`.
pub fn error_screens(message: &str) -> Vec<Frame> {
    let lines = split_by_n(message, COLUMNS);
    lines
        .chunks(ERROR_LINES_PER_SCREEN)
        .map(|chunk| {
            let mut frame = Frame::new();
            draw_header(&mut frame, "Error");
            for (row, line) in chunk.iter().enumerate() {
                draw_text(&mut frame, 0, ERROR_LINE_HEIGHT * (row as i32 + 1), line);
            }
            frame
        })
        .collect()
}

/// Splash shown once at boot: a title over a filling progress bar.
pub fn boot(hostname: &str, steps: u32) -> Vec<Frame> {
    (1..=steps)
        .map(|step| {
            let mut frame = Frame::new();
            draw_large(&mut frame, 0, 1, &center("Status", 9), 2);
            draw_text(&mut frame, 0, 30, &center(hostname, COLUMNS));
            let percent = f64::from(step) * 100.0 / f64::from(steps);
            draw_bar(&mut frame, Point::new(4, 50), Size::new(120, 8), percent);
            frame
        })
        .collect()
}

/// "Bye" screen followed by frames that add one wave each.
pub fn farewell() -> Vec<Frame> {
    let mut frame = Frame::new();
    draw_header(&mut frame, "STOP");
    draw_large(&mut frame, 0, 7, "Bye", 3);
    let mut frames = vec![frame.clone()];
    for i in 0..3 {
        draw_large(&mut frame, 22 + i * 7, 11, "~", 3);
        frames.push(frame.clone());
    }
    frames
}

/// Splits an address after its eighth character, where the two display
/// rows break.
fn split_address(address: &str) -> (&str, &str) {
    match address.char_indices().nth(8) {
        Some((idx, _)) => address.split_at(idx),
        None => (address, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forty_character_error_wraps_to_three_lines_on_one_screen() {
        let message = "a".repeat(40);
        assert_eq!(split_by_n(&message, COLUMNS).len(), 3);
        let screens = error_screens(&message);
        assert_eq!(screens.len(), 1);
        assert!(!screens[0].is_blank());
    }

    #[test]
    fn long_errors_spill_onto_more_screens() {
        let message = "b".repeat(COLUMNS * 4 + 1);
        assert_eq!(error_screens(&message).len(), 2);
    }

    #[test]
    fn short_addresses_do_not_split() {
        assert_eq!(split_address("N/A"), ("N/A", ""));
        assert_eq!(split_address("192.168.1.42"), ("192.168.", "1.42"));
        let frame = network(&NetworkIdentity {
            hostname: "pi".to_string(),
            address: "N/A".to_string(),
        });
        assert!(!frame.is_blank());
    }

    #[test]
    fn farewell_adds_a_wave_per_frame() {
        let frames = farewell();
        assert_eq!(frames.len(), 4);
        for pair in frames.windows(2) {
            assert!(pair[1].lit_pixels() > pair[0].lit_pixels());
        }
    }

    #[test]
    fn boot_bar_fills_up() {
        let frames = boot("raspberrypi", 5);
        assert_eq!(frames.len(), 5);
        assert!(frames[4].lit_pixels() > frames[0].lit_pixels());
    }
}
