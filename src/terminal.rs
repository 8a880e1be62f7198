use core::fmt::Write;

use defmt::{panic, unreachable, *};
use heapless::{Deque, Vec};
use num_traits::AsPrimitive;
use rtic::Mutex;

use crate::app::terminal::Context;
use rtic_altimeter::{barometer::pressure_altitude, bmp180::Oversampling, storage::Sample};

pub const BUFFER_SIZE: usize = 32;
const OK_STR: &str = "<ok>\r\n";

const HELP_STR: &str = "Commands:\r
    help\r
    oversampling <0|1|2|3>?\r
    temp\r
    press\r
    alt\r
    watch samples\r
    dump samples\r
    reset\r
";

/// Terminal handler
///
/// Commands:
/// - `help` - Print help
/// - `oversampling <0|1|2|3>?` - Get or set the pressure oversampling setting
/// - `temp` - Print the most recent temperature
/// - `press` - Print the most recent pressure
/// - `alt` - Print the altitude derived from the most recent pressure
/// - `watch samples` - Stream samples until `s` is pressed
/// - `dump samples` - Dump the stored sample history
/// - `reset` - Reset the MCU
#[cfg_attr(feature = "sizing", inline(never))]
pub async fn terminal(mut cx: Context<'_>) {
    loop {
        let Some(line) = cx.shared.buffer.lock(get_line) else {
            return;
        };

        // Split line into arguments
        let mut args = line.split(|b| is_whitespace(*b));

        // Handle command
        match args.next() {
            None | Some(&[]) => trace!("Empty command"),
            Some(b"help") => print_uart(&mut cx, HELP_STR),
            Some(b"oversampling") => match args.next() {
                None | Some(&[]) => match cx.shared.oversampling.lock(|oss| *oss) {
                    Oversampling::UltraLowPower => print_uart(&mut cx, "0\r\n"),
                    Oversampling::Standard => print_uart(&mut cx, "1\r\n"),
                    Oversampling::HighResolution => print_uart(&mut cx, "2\r\n"),
                    Oversampling::UltraHighResolution => print_uart(&mut cx, "3\r\n"),
                },
                Some(b"0") => {
                    cx.shared
                        .oversampling
                        .lock(|oss| *oss = Oversampling::UltraLowPower);
                    print_uart(&mut cx, OK_STR);
                }
                Some(b"1") => {
                    cx.shared
                        .oversampling
                        .lock(|oss| *oss = Oversampling::Standard);
                    print_uart(&mut cx, OK_STR);
                }
                Some(b"2") => {
                    cx.shared
                        .oversampling
                        .lock(|oss| *oss = Oversampling::HighResolution);
                    print_uart(&mut cx, OK_STR);
                }
                Some(b"3") => {
                    cx.shared
                        .oversampling
                        .lock(|oss| *oss = Oversampling::UltraHighResolution);
                    print_uart(&mut cx, OK_STR);
                }
                Some(b) => unknown_argument(&mut cx, b),
            },
            Some(b"temp") => {
                let sample = cx.shared.storage.lock(|s| s.recent());
                if let Some(sample) = sample {
                    cx.shared.usart.lock(|tx| {
                        print_uint(tx, sample.secs());
                        print_uart_locked(tx, " ");
                        print_decimal(tx, i32::from(sample.deci_celsius()));
                        print_uart_locked(tx, " C\r\n");
                    });
                } else {
                    print_uart(&mut cx, "<missing>\r\n");
                }
            }
            Some(b"press") => {
                let sample = cx.shared.storage.lock(|s| s.recent());
                if let Some(sample) = sample {
                    cx.shared.usart.lock(|tx| {
                        print_uint(tx, sample.secs());
                        print_uart_locked(tx, " ");
                        print_uint(tx, sample.pascals());
                        print_uart_locked(tx, " Pa\r\n");
                    });
                } else {
                    print_uart(&mut cx, "<missing>\r\n");
                }
            }
            Some(b"alt") => {
                let sample = cx.shared.storage.lock(|s| s.recent());
                if let Some(sample) = sample {
                    let decimeters = (pressure_altitude(sample.pascals() as f32) * 10.0) as i32;
                    cx.shared.usart.lock(|tx| {
                        print_uint(tx, sample.secs());
                        print_uart_locked(tx, " ");
                        print_decimal(tx, decimeters);
                        print_uart_locked(tx, " m\r\n");
                    });
                } else {
                    print_uart(&mut cx, "<missing>\r\n");
                }
            }
            Some(b"watch") => match args.next() {
                None | Some(&[]) => print_uart(&mut cx, "Missing argument\r\n"),
                Some(b"samples") => watch_samples(&mut cx).await,
                Some(b) => unknown_argument(&mut cx, b),
            },
            Some(b"dump") => match args.next() {
                None | Some(&[]) => print_uart(&mut cx, "Missing argument\r\n"),
                Some(b"samples") => cx.shared.storage.lock(|storage| {
                    for sample in storage.oldest() {
                        cx.shared.usart.lock(|tx| {
                            print_sample(tx, sample);
                        });
                    }
                }),
                Some(b) => unknown_argument(&mut cx, b),
            },
            Some(b"reset") => {
                print_uart(&mut cx, "Resetting...\r\n");
                cortex_m::peripheral::SCB::sys_reset();
            }
            Some(b) => {
                dbg!(b);
                print_uart(&mut cx, "Unknown command: '");
                // SAFETY: b may not be valid UTF-8, but we don't care cause we're just printing it
                // Also, including UTF8 checks would add a lot to the binary size
                print_uart(&mut cx, unsafe { core::str::from_utf8_unchecked(b) });
                print_uart(&mut cx, "'\r\n");
            }
        }
    }
}

fn get_line(buffer: &mut Deque<u8, BUFFER_SIZE>) -> Option<Vec<u8, BUFFER_SIZE>> {
    // Find newline
    let Some(idx) = buffer.iter().position(|b| is_newline(*b)) else {
        // No newline found
        return None;
    };

    // Pop line from buffer
    let mut line = Vec::<_, BUFFER_SIZE>::new();
    for _ in 0..=idx {
        // SAFETY: idx is guaranteed to be valid in buffer
        // line is guaranteed to be large enough to hold idx + 1 bytes
        unsafe {
            let b = buffer.pop_front_unchecked();
            line.push_unchecked(b);
        }
    }

    Some(line)
}

#[inline]
pub const fn is_newline(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

#[inline]
pub const fn is_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\n' || b == b'\r' || b == b'\t'
}

fn print_uart(cx: &mut Context, str: &str) {
    cx.shared.usart.lock(|tx| print_uart_locked(tx, str));
}

fn print_uart_locked<W: Write>(tx: &mut W, str: &str) {
    if tx.write_str(str).is_err() {
        panic!("Failed to write to UART");
    }
}

fn unknown_argument(cx: &mut Context, arg: &[u8]) {
    cx.shared.usart.lock(|tx| {
        print_uart_locked(tx, "Unknown argument: '");
        // SAFETY: b may not be valid UTF-8, but we don't care cause we're just printing it
        // Also, including UTF8 checks would add a lot to the binary size
        print_uart_locked(tx, unsafe { core::str::from_utf8_unchecked(arg) });
        print_uart_locked(tx, "'\r\n");
    });
}

/// Print a value held in tenths, e.g. deci-°C or decimeters
fn print_decimal<W: Write>(tx: &mut W, tenths: i32) {
    if tenths < 0 {
        print_uart_locked(tx, "-");
    }

    let tenths = tenths.unsigned_abs();
    print_uint(tx, tenths / 10);
    print_uart_locked(tx, ".");
    print_uint(tx, tenths % 10);
}

fn print_sample<W: Write>(tx: &mut W, sample: &Sample) {
    print_uint(tx, sample.secs());
    print_uart_locked(tx, " ");
    print_decimal(tx, i32::from(sample.deci_celsius()));
    print_uart_locked(tx, " C ");
    print_uint(tx, sample.pascals());
    print_uart_locked(tx, " Pa\r\n");
}

fn print_uint<W: Write>(tx: &mut W, mut num: u32) {
    const BUF_SIZE: usize = 10;

    let mut buf = [0u8; BUF_SIZE];
    let mut idx = 0;

    loop {
        let digit: u8 = (num % 10).as_();
        num /= 10;

        buf[BUF_SIZE - idx - 1] = b'0' + digit;
        idx += 1;

        if num == 0 {
            break;
        }
    }

    let buf = &buf[BUF_SIZE - idx..];
    // SAFETY: buf is guaranteed to be valid ASCII
    print_uart_locked(tx, unsafe { core::str::from_utf8_unchecked(buf) });
}

/// Watch samples until 's' is pressed
async fn watch_samples(cx: &mut Context<'_>) {
    print_uart(cx, "Press 's' to stop watching\r\n");
    loop {
        // Wait for storage to re-send a sample
        let Ok(sample) = cx.local.watch_rx.recv().await else {
            unreachable!("Sender dropped")
        };

        // Print sample to UART
        cx.shared.usart.lock(|tx| {
            print_sample(tx, &sample);
        });

        // Check if 's' is in the buffer and stop if it is
        // Also, clear the buffer to prevent it from overflowing
        let to_break = cx.shared.buffer.lock(|buffer| {
            let to_break = buffer.iter().any(|b| *b == b's');

            // Clear buffer
            buffer.clear();

            to_break
        });
        if to_break {
            break;
        }
    }
}
