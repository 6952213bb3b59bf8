//! LED core on-device test
//!
//! Exercises the coordinator, the disco animation and color commands against
//! a recording strip, so no LEDs need to be attached.
//!
//! Run with `cargo run --release --bin led_core_test`.

#![no_std]
#![no_main]

extern crate alloc;

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer, with_timeout};
use esp_hal::clock::CpuClock;
use esp_hal::timer::timg::TimerGroup;
use esp_hal_embassy::Executor;
use esp_println::println;
use led_disco_rs::animation::{self, RAINBOW_PALETTE, RandomSource, XorShift32, dimmed};
use led_disco_rs::color_command::{self, ColorCommand, clamp_channel};
use led_disco_rs::http_server::{Method, RequestHead, apply_color_form};
use led_disco_rs::led_control::{BLACK, Frame, StripDriver};
use led_disco_rs::led_state::LedCoordinator;
use led_disco_rs::{BoardError, config};
use smart_leds::RGB8;
use static_cell::StaticCell;

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

/// Strip stand-in that remembers what was last refreshed
struct RecordingStrip {
    staged: Frame,
    shown: Frame,
    refreshes: u32,
}

impl RecordingStrip {
    const fn new() -> Self {
        Self {
            staged: [BLACK; config::PIXEL_COUNT],
            shown: [BLACK; config::PIXEL_COUNT],
            refreshes: 0,
        }
    }
}

impl StripDriver for RecordingStrip {
    fn pixel_count(&self) -> usize {
        self.staged.len()
    }

    fn set_pixel(&mut self, index: usize, color: RGB8) -> Result<(), BoardError> {
        *self.staged.get_mut(index).ok_or(BoardError::LedError)? = color;
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), BoardError> {
        self.shown = self.staged;
        self.refreshes += 1;
        Ok(())
    }
}

type TestCoordinator = LedCoordinator<RecordingStrip>;

static COORDINATOR_CELL: StaticCell<TestCoordinator> = StaticCell::new();
static EXECUTOR: StaticCell<Executor> = StaticCell::new();
static ANIMATION_DONE: Signal<CriticalSectionRawMutex, u32> = Signal::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("❌ Test failed: {}", info);
    loop {}
}

fn lit_pixels(frame: &Frame) -> usize {
    frame.iter().filter(|&&pixel| pixel != BLACK).count()
}

fn solid(color: RGB8) -> Frame {
    [color; config::PIXEL_COUNT]
}

async fn shown(coordinator: &TestCoordinator) -> (Frame, u32) {
    coordinator
        .with_strip(|strip| (strip.shown, strip.refreshes))
        .await
}

#[embassy_executor::task]
async fn animation_task(coordinator: &'static TestCoordinator) {
    let mut rng = XorShift32::new(0x1234_5678);
    match animation::run(coordinator, &mut rng).await {
        Ok(frames) => ANIMATION_DONE.signal(frames),
        Err(e) => panic!("animation failed: {:?}", e),
    }
}

fn test_clamp_policy() {
    println!("\n1. Clamp policy");

    assert_eq!(clamp_channel(0), 0);
    assert_eq!(clamp_channel(30), 30);
    assert_eq!(clamp_channel(60), 60);
    assert_eq!(clamp_channel(61), 60);
    assert_eq!(clamp_channel(255), 60);
    assert_eq!(clamp_channel(300), 60);
    assert_eq!(clamp_channel(i32::MAX), 60);
    // Negative input floors to zero instead of wrapping through u8
    assert_eq!(clamp_channel(-1), 0);
    assert_eq!(clamp_channel(-5), 0);
    assert_eq!(clamp_channel(i32::MIN), 0);
    for value in -100..400 {
        assert_eq!(clamp_channel(value) as i32, value.clamp(0, 60));
    }
    println!("✅ clamp(x) = max(0, min(60, x))");
}

fn test_animation_frames() {
    println!("\n2. Animation frame generation");

    assert_eq!(dimmed(RAINBOW_PALETTE[0]), RGB8::new(15, 0, 0));
    assert_eq!(dimmed(RAINBOW_PALETTE[1]), RGB8::new(15, 7, 0));
    assert_eq!(dimmed(RAINBOW_PALETTE[5]), RGB8::new(35, 0, 10));
    assert_eq!(dimmed(RAINBOW_PALETTE[6]), RGB8::new(28, 0, 11));

    let mut rng = XorShift32::new(42);
    let mut frame = [BLACK; config::PIXEL_COUNT];
    let mut seen_min = usize::MAX;
    let mut seen_max = 0;

    for _ in 0..500 {
        let lit = animation::next_frame(&mut rng, &mut frame);
        assert!((1..=config::PIXEL_COUNT).contains(&lit));
        // Distinct indices: exactly `lit` pixels end up non-black
        assert_eq!(lit_pixels(&frame), lit);
        for pixel in frame.iter().filter(|&&pixel| pixel != BLACK) {
            assert!(RAINBOW_PALETTE.iter().any(|&entry| dimmed(entry) == *pixel));
            assert!(pixel.r < 40 && pixel.g < 40 && pixel.b < 40);
        }
        seen_min = seen_min.min(lit);
        seen_max = seen_max.max(lit);
    }
    assert!(seen_min < seen_max, "lit count never varied");
    println!("✅ 500 frames: lit count in {}..={}", seen_min, seen_max);

    // A generator that keeps repeating itself still yields distinct pixels
    struct Repeating {
        values: [u32; 6],
        at: usize,
    }
    impl RandomSource for Repeating {
        fn next_u32(&mut self) -> u32 {
            let value = self.values[self.at % self.values.len()];
            self.at += 1;
            value
        }
    }
    let mut repeating = Repeating {
        // k = 3, then pixel 5, 5 and 5 again (both rejected), 7, 9
        values: [2, 5, 5, 5, 7, 9],
        at: 0,
    };
    let lit = animation::next_frame(&mut repeating, &mut frame);
    assert_eq!(lit, 3);
    assert_eq!(lit_pixels(&frame), 3);
    assert!(frame[5] != BLACK && frame[7] != BLACK && frame[9] != BLACK);
    println!("✅ Duplicate indices are drawn again");
}

fn set_color_request(body: &[u8]) -> (RequestHead, [u8; 256]) {
    let head_text = b"POST /set_color HTTP/1.1\r\n\r\n";
    let mut buffer = [0u8; 256];
    buffer[..head_text.len()].copy_from_slice(head_text);
    buffer[head_text.len()..head_text.len() + body.len()].copy_from_slice(body);

    let mut path: heapless::String<64> = heapless::String::new();
    path.push_str("/set_color").unwrap();
    let head = RequestHead {
        method: Method::Post,
        path,
        body_start: head_text.len(),
        content_length: body.len(),
    };
    (head, buffer)
}

async fn test_rejected_bodies(coordinator: &'static TestCoordinator) {
    println!("\n3. Unreadable color bodies leave the LEDs alone");

    let before = shown(coordinator).await;

    // Empty body
    let (head, buffer) = set_color_request(b"");
    let outcome = apply_color_form(coordinator, &head, &buffer, Ok(head.body_start))
        .await
        .expect("empty body failed");
    assert_eq!(outcome, None);

    // Connection dropped before any body byte arrived
    let (head, buffer) = set_color_request(b"red=30&green=30&blue=30");
    let outcome = apply_color_form(coordinator, &head, &buffer, Ok(head.body_start))
        .await
        .expect("missing body failed");
    assert_eq!(outcome, None);

    // Read error
    let outcome = apply_color_form(coordinator, &head, &buffer, Err(BoardError::HttpError))
        .await
        .expect("read error failed");
    assert_eq!(outcome, None);

    assert!(coordinator.is_animation_active());
    assert_eq!(coordinator.current_color().await, BLACK);
    assert_eq!(shown(coordinator).await, before);
    println!("✅ No color applied, animation still active");
}

async fn test_animation_and_override(coordinator: &'static TestCoordinator, spawner: Spawner) {
    println!("\n4. Animation runs until the first color command");

    assert!(coordinator.is_animation_active());
    assert_eq!(coordinator.current_color().await, BLACK);

    spawner
        .spawn(animation_task(coordinator))
        .expect("failed to spawn animation task");

    let mut frames = heapless::Vec::<Frame, 4>::new();
    for _ in 0..4 {
        Timer::after(Duration::from_millis(config::ANIMATION_INTERVAL_MS)).await;
        let (frame, _) = shown(coordinator).await;
        assert!(lit_pixels(&frame) >= 1);
        let _ = frames.push(frame);
    }
    let (_, refreshes) = shown(coordinator).await;
    assert!(refreshes >= 3, "only {} frames in 1s", refreshes);
    assert!(
        frames.windows(2).any(|pair| pair[0] != pair[1]),
        "animation did not change"
    );
    assert!(coordinator.is_animation_active());
    println!("✅ {} animation frames committed, pattern changes", refreshes);

    println!("\n5. Color command overrides the animation");
    let command = ColorCommand::from_form(b"red=30&green=300&blue=-5");
    let ack = color_command::handle(coordinator, command)
        .await
        .expect("color command failed");
    let expected = RGB8::new(30, 60, 0);
    assert_eq!(ack.applied, expected);
    assert!(!coordinator.is_animation_active());
    assert_eq!(coordinator.current_color().await, expected);
    assert_eq!(shown(coordinator).await.0, solid(expected));
    println!("✅ red=30&green=300&blue=-5 -> {:?}", ack.applied);

    let drawn = with_timeout(
        Duration::from_millis(config::ANIMATION_INTERVAL_MS * 2),
        ANIMATION_DONE.wait(),
    )
    .await
    .expect("animation did not stop");
    assert!(drawn >= 3);
    assert_eq!(shown(coordinator).await.0, solid(expected));
    println!("✅ Animation stopped after {} frames, strip shows static color", drawn);

    println!("\n6. Animation frames are dropped after an override");
    let before = shown(coordinator).await;
    let mut frame = [BLACK; config::PIXEL_COUNT];
    frame[0] = RGB8::new(10, 0, 0);
    let committed = coordinator
        .commit_animation_frame(&frame)
        .await
        .expect("commit failed");
    assert!(!committed);
    assert_eq!(shown(coordinator).await, before);
    println!("✅ Late animation frame ignored");

    println!("\n7. Idempotence");
    coordinator
        .apply_static_color(expected)
        .await
        .expect("apply failed");
    let once = shown(coordinator).await.0;
    coordinator
        .apply_static_color(expected)
        .await
        .expect("apply failed");
    assert_eq!(shown(coordinator).await.0, once);
    assert_eq!(coordinator.current_color().await, expected);
    println!("✅ Applying the same color twice changes nothing");

    println!("\n8. Consecutive commands");
    color_command::handle(coordinator, ColorCommand::new(10, 10, 10))
        .await
        .expect("color command failed");
    color_command::handle(coordinator, ColorCommand::new(50, 0, 0))
        .await
        .expect("color command failed");
    Timer::after(Duration::from_millis(config::ANIMATION_INTERVAL_MS * 2)).await;
    assert_eq!(coordinator.current_color().await, RGB8::new(50, 0, 0));
    assert_eq!(shown(coordinator).await.0, solid(RGB8::new(50, 0, 0)));
    assert!(!coordinator.is_animation_active());
    println!("✅ Final color (50, 0, 0), animation stays off");

    println!("\n9. Explicit frame commit");
    let mut frame = [BLACK; config::PIXEL_COUNT];
    frame[3] = RGB8::new(1, 2, 3);
    coordinator.commit_frame(&frame).await.expect("commit failed");
    assert_eq!(shown(coordinator).await.0, frame);
    coordinator
        .restore_static_color()
        .await
        .expect("restore failed");
    assert_eq!(shown(coordinator).await.0, solid(RGB8::new(50, 0, 0)));
    println!("✅ commit_frame writes the whole frame, restore brings the color back");

    println!("\n10. Out-of-range colors are clamped by the coordinator");
    coordinator
        .apply_static_color(RGB8::new(255, 200, 61))
        .await
        .expect("apply failed");
    let ceiling = RGB8::new(60, 60, 60);
    assert_eq!(coordinator.current_color().await, ceiling);
    assert_eq!(shown(coordinator).await.0, solid(ceiling));

    coordinator
        .apply_static_color(RGB8::new(0, 61, 60))
        .await
        .expect("apply failed");
    assert_eq!(coordinator.current_color().await, RGB8::new(0, 60, 60));
    println!("✅ (255, 200, 61) shows as (60, 60, 60)");

    println!("\n11. A received body goes through the whole command path");
    let (head, buffer) = set_color_request(b"red= 20&green=90&blue=5");
    let received = head.body_start + head.content_length;
    let ack = apply_color_form(coordinator, &head, &buffer, Ok(received))
        .await
        .expect("color form failed")
        .expect("body not applied");
    assert_eq!(ack.applied, RGB8::new(20, 60, 5));
    assert_eq!(shown(coordinator).await.0, solid(RGB8::new(20, 60, 5)));
    println!("✅ red= 20&green=90&blue=5 -> {:?}", ack.applied);
}

#[embassy_executor::task]
async fn test_runner(spawner: Spawner, coordinator: &'static TestCoordinator) {
    println!("=== LED core test ===");

    test_clamp_policy();
    test_animation_frames();
    test_rejected_bodies(coordinator).await;
    test_animation_and_override(coordinator, spawner).await;

    println!("\n=== All LED core tests passed ===");
}

#[esp_hal::main]
fn main() -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Initialize heap allocator
    esp_alloc::heap_allocator!(size: 32 * 1024);

    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    let coordinator = COORDINATOR_CELL.init(LedCoordinator::new(RecordingStrip::new()));

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(test_runner(spawner, coordinator)).ok();
    });
}
