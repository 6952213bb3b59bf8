#![no_std]
#![no_main]

use esp_hal::clock::CpuClock;
use esp_hal::gpio::Level;
use esp_hal::rmt::{Rmt, TxChannelConfig, TxChannelCreator};
use esp_hal::rng::Rng;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_println::println;

// Standard library imports
extern crate alloc;

// WiFi imports
use esp_wifi::wifi;

// Embassy-net imports
use embassy_net::{Config, Stack, StackResources};
use embassy_time::{Duration, Timer};
use esp_hal_embassy::Executor;
use static_cell::StaticCell;

// Import our library modules
use led_disco_rs::animation::{self, XorShift32};
use led_disco_rs::http_server::HttpServer;
use led_disco_rs::led_control::Ws2812Strip;
use led_disco_rs::led_state::LedCoordinator;
use led_disco_rs::state_machine::{Action, SystemEvent, SystemStateMachine};
use led_disco_rs::wifi::AccessPointManager;
use led_disco_rs::{BoardError, config, dhcp_server, fatal, mdns};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

const HTTP_WORKER_COUNT: usize = 2;

// Static cells for embassy components
static WIFI_INIT_CELL: StaticCell<esp_wifi::EspWifiController<'static>> = StaticCell::new();
static STACK_CELL: StaticCell<Stack<'static>> = StaticCell::new();
static AP_MANAGER_CELL: StaticCell<AccessPointManager<'static>> = StaticCell::new();
// Use the concrete channel type
type ConcreteChannel = esp_hal::rmt::Channel<esp_hal::Blocking, 0>;
type Coordinator = LedCoordinator<Ws2812Strip<ConcreteChannel>>;
static COORDINATOR_CELL: StaticCell<Coordinator> = StaticCell::new();

// Static executor for embassy tasks
static EXECUTOR: StaticCell<Executor> = StaticCell::new();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("[PANIC] {}", info);
    loop {}
}

// Embassy task to run the network stack
#[embassy_executor::task]
async fn net_task(
    mut runner: embassy_net::Runner<'static, esp_wifi::wifi::WifiDevice<'static>>,
) -> ! {
    runner.run().await
}

/// Disco animation; returns once the first color command arrives
#[embassy_executor::task]
async fn animation_task(coordinator: &'static Coordinator, seed: u32) {
    let mut rng = XorShift32::new(seed);
    if let Err(e) = animation::run(coordinator, &mut rng).await {
        fatal("animation frame commit failed", e);
    }
}

/// HTTP worker; several run side by side on the same port
#[embassy_executor::task(pool_size = HTTP_WORKER_COUNT)]
async fn http_worker(
    stack: &'static Stack<'static>,
    coordinator: &'static Coordinator,
    worker_id: usize,
) -> ! {
    HttpServer::new(stack).serve(coordinator, worker_id).await
}

/// DHCP server background task
#[embassy_executor::task]
async fn dhcp_server_task(stack: &'static Stack<'static>) {
    println!("[DHCP] Starting DHCP server task...");
    if let Err(e) = dhcp_server::run(stack).await {
        println!("[DHCP] DHCP server error: {:?}", e);
    }
}

/// mDNS server background task
#[embassy_executor::task]
async fn mdns_server_task(stack: &'static Stack<'static>) {
    println!("[MDNS] Starting mDNS server task...");
    if let Err(e) = mdns::run(stack).await {
        println!("[MDNS] mDNS server error: {:?}", e);
    }
}

// State machine driven access point supervisor
#[embassy_executor::task]
async fn supervisor_task(
    ap_manager: &'static mut AccessPointManager<'static>,
    stack: &'static Stack<'static>,
) -> ! {
    println!("[STATE] Starting state machine driven supervisor task");

    let mut state_machine = SystemStateMachine::new();
    state_machine.handle_event(SystemEvent::SystemStarted);

    loop {
        for action in state_machine.update() {
            match action {
                Action::StartAccessPoint => {
                    match ap_manager.start(config::AP_SSID, config::AP_PASSWORD) {
                        Ok(_) => {
                            state_machine.handle_event(SystemEvent::AccessPointStarted);
                        }
                        Err(e) => {
                            println!("[WIFI] Access point start failed: {:?}", e);
                            state_machine.handle_event(SystemEvent::AccessPointFailed);
                            Timer::after(Duration::from_millis(1000)).await;
                        }
                    }
                }
                Action::StartNetworkServices => {
                    if stack.is_config_up() {
                        println!("[STATE] Network services ready on {}", config::AP_IP_ADDRESS);
                        state_machine.handle_event(SystemEvent::ServicesStarted);
                    }
                }
                Action::MonitorAccessPoint => {
                    if let Err(e) = ap_manager.monitor() {
                        println!("[WIFI] Monitor error: {:?}", e);
                    }
                    if !ap_manager.is_running() {
                        state_machine.handle_event(SystemEvent::AccessPointStopped);
                    } else {
                        Timer::after(Duration::from_millis(config::AP_MONITOR_INTERVAL_MS)).await;
                    }
                }
                Action::SystemRecover => {
                    println!("[STATE] Initiating access point recovery...");
                    if let Err(e) = ap_manager.stop() {
                        println!("[WIFI] Stop failed: {:?}", e);
                    }
                    Timer::after(Duration::from_millis(1000)).await;
                    state_machine.handle_event(SystemEvent::RecoveryRequested);
                    state_machine.handle_event(SystemEvent::RecoveryCompleted);
                }
                Action::LogError(error_state) => {
                    println!("[STATE] Error logged: {:?}", error_state);
                }
                Action::Halt => fatal("access point could not be started", BoardError::WiFiError),
            }
        }

        // Small delay to prevent busy loop
        Timer::after(Duration::from_millis(100)).await;
    }
}

#[esp_hal::main]
fn main() -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Initialize heap allocator for WiFi (72KB)
    esp_alloc::heap_allocator!(size: 72 * 1024);

    // Initialize embassy time system
    let timer_group0 = TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timer_group0.timer0);

    println!("[MAIN] led-disco-rs {}", led_disco_rs::VERSION);

    // LED strip first, so the animation runs while the radio comes up
    println!(
        "[LED] Configured to control {} addressable LEDs on GPIO{}",
        config::PIXEL_COUNT,
        config::LED_DATA_PIN
    );

    let rmt = match Rmt::new(peripherals.RMT, Rate::from_mhz(10)) {
        Ok(rmt) => rmt,
        Err(e) => {
            println!("[LED] Failed to initialize RMT: {:?}", e);
            panic!("RMT initialization failed");
        }
    };

    let tx_config = TxChannelConfig::default()
        .with_clk_divider(1)
        .with_idle_output_level(Level::Low)
        .with_idle_output(false)
        .with_carrier_modulation(false);

    let rmt_channel = match rmt.channel0.configure(peripherals.GPIO20, tx_config) {
        Ok(channel) => channel,
        Err(e) => {
            println!("[LED] Failed to configure RMT channel: {:?}", e);
            panic!("RMT channel configuration failed");
        }
    };

    let mut strip = Ws2812Strip::new(rmt_channel);
    if let Err(e) = strip.clear() {
        fatal("LED strip initialization failed", e);
    }
    let coordinator = COORDINATOR_CELL.init(LedCoordinator::new(strip));
    println!("[LED] LED strip cleared, coordinator ready");

    // Seeds are drawn before the RNG is handed to the WiFi driver
    let mut rng = Rng::new(peripherals.RNG);
    let animation_seed = rng.random();
    let net_seed = ((rng.random() as u64) << 32) | rng.random() as u64;

    // Initialize WiFi driver
    let timer_group1 = TimerGroup::new(peripherals.TIMG1);
    let wifi_init = match esp_wifi::init(timer_group1.timer0, rng, peripherals.RADIO_CLK) {
        Ok(wifi_init) => wifi_init,
        Err(e) => {
            println!("[WIFI] WiFi driver initialization failed: {:?}", e);
            panic!("WiFi initialization failed");
        }
    };
    println!("[WIFI] WiFi driver initialized successfully");

    // Store wifi_init in static cell for 'static lifetime
    let wifi_init_ref = WIFI_INIT_CELL.init(wifi_init);

    let (wifi_controller, wifi_interfaces) = match wifi::new(wifi_init_ref, peripherals.WIFI) {
        Ok(parts) => parts,
        Err(e) => {
            println!("[WIFI] WiFi controller creation failed: {:?}", e);
            panic!("WiFi controller creation failed");
        }
    };
    let wifi_device = wifi_interfaces.ap;

    // Create embassy-net stack with the static access point address
    static STACK_RESOURCES: StaticCell<StackResources<6>> = StaticCell::new();
    let stack_resources = STACK_RESOURCES.init(StackResources::new());

    let net_config = Config::ipv4_static(led_disco_rs::wifi::ap_ip_config());
    let (stack, runner) = embassy_net::new(wifi_device, net_config, stack_resources, net_seed);
    let stack_ref = STACK_CELL.init(stack);

    println!("[WIFI] Embassy-net stack created on {}", config::AP_IP_ADDRESS);

    let ap_manager = AP_MANAGER_CELL.init(AccessPointManager::new(wifi_controller));

    // Initialize embassy executor and run tasks
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        println!("[MAIN] Spawning animation task...");
        if let Err(e) = spawner.spawn(animation_task(coordinator, animation_seed)) {
            println!("[MAIN] Failed to spawn animation task: {:?}", e);
            fatal("animation task could not be spawned", BoardError::SystemError);
        }

        println!("[MAIN] Spawning network task...");
        if let Err(e) = spawner.spawn(net_task(runner)) {
            println!("[MAIN] Failed to spawn network task: {:?}", e);
            fatal("network task could not be spawned", BoardError::SystemError);
        }

        println!("[MAIN] Spawning supervisor task...");
        if let Err(e) = spawner.spawn(supervisor_task(ap_manager, stack_ref)) {
            println!("[MAIN] Failed to spawn supervisor task: {:?}", e);
            fatal("supervisor task could not be spawned", BoardError::SystemError);
        }

        for worker_id in 0..HTTP_WORKER_COUNT {
            match spawner.spawn(http_worker(stack_ref, coordinator, worker_id)) {
                Ok(_) => println!("[MAIN] HTTP worker {} spawned", worker_id),
                Err(e) => println!("[MAIN] Failed to spawn HTTP worker {}: {:?}", worker_id, e),
            }
        }

        println!("[MAIN] Spawning DHCP server task...");
        if let Err(e) = spawner.spawn(dhcp_server_task(stack_ref)) {
            println!("[MAIN] Failed to spawn DHCP server task: {:?}", e);
        }

        println!("[MAIN] Spawning mDNS server task...");
        match spawner.spawn(mdns_server_task(stack_ref)) {
            Ok(_) => println!("[MAIN] mDNS task spawned successfully"),
            Err(e) => println!("[MAIN] Failed to spawn mDNS task: {:?}", e),
        }
    });
}
