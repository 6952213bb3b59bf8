//! State machine on-device test
//!
//! Walks the supervisor state machine through boot, access point failures,
//! recovery and the final halt.

#![no_std]
#![no_main]

extern crate alloc;

use esp_hal::clock::CpuClock;
use esp_println::println;
use led_disco_rs::state_machine::{
    Action, StateTransition, SystemEvent, SystemState, SystemStateMachine,
};

// Add app descriptor for espflash compatibility
esp_bootloader_esp_idf::esp_app_desc!();

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("❌ Test failed: {}", info);
    loop {}
}

#[esp_hal::main]
fn main() -> ! {
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let _peripherals = esp_hal::init(config);

    // Initialize heap allocator
    esp_alloc::heap_allocator!(size: 32 * 1024);

    println!("=== State machine test ===");

    let mut state_machine = SystemStateMachine::new();

    println!("\n1. Initial state");
    assert_eq!(state_machine.get_current_state(), SystemState::SystemInit);
    assert!(state_machine.update().is_empty());
    println!("✅ Initial state: {:?}", state_machine.get_current_state());

    println!("\n2. Boot sequence");
    state_machine.handle_event(SystemEvent::SystemStarted);
    assert_eq!(
        state_machine.get_current_state(),
        SystemState::AccessPointStarting
    );
    assert_eq!(state_machine.update().as_slice(), &[Action::StartAccessPoint]);

    state_machine.handle_event(SystemEvent::AccessPointStarted);
    assert_eq!(
        state_machine.get_current_state(),
        SystemState::ServicesStarting
    );
    assert_eq!(
        state_machine.update().as_slice(),
        &[Action::StartNetworkServices]
    );

    state_machine.handle_event(SystemEvent::ServicesStarted);
    assert_eq!(state_machine.get_current_state(), SystemState::Operational);
    assert!(state_machine.is_operational());
    assert_eq!(
        state_machine.update().as_slice(),
        &[Action::MonitorAccessPoint]
    );
    println!("✅ Boot sequence reaches {:?}", state_machine.get_current_state());

    println!("\n3. Irrelevant events are ignored");
    assert_eq!(
        state_machine.handle_event(SystemEvent::AccessPointStarted),
        StateTransition::Stay
    );
    assert_eq!(state_machine.get_current_state(), SystemState::Operational);
    println!("✅ Operational state kept");

    println!("\n4. Access point stops while operational");
    state_machine.handle_event(SystemEvent::AccessPointStopped);
    assert_eq!(state_machine.get_current_state(), SystemState::Recovering);
    assert_eq!(state_machine.get_recovery_count(), 1);
    assert_eq!(state_machine.update().as_slice(), &[Action::SystemRecover]);

    // The supervisor sends both events after restarting the radio
    state_machine.handle_event(SystemEvent::RecoveryRequested);
    assert_eq!(state_machine.get_current_state(), SystemState::Recovering);
    state_machine.handle_event(SystemEvent::RecoveryCompleted);
    assert_eq!(
        state_machine.get_current_state(),
        SystemState::AccessPointStarting
    );
    assert_eq!(
        state_machine.get_previous_state(),
        Some(SystemState::Recovering)
    );
    println!("✅ Recovery restarts the access point");

    println!("\n5. Start retries");
    assert_eq!(
        state_machine.handle_event(SystemEvent::AccessPointFailed),
        StateTransition::Stay
    );
    assert_eq!(state_machine.get_retry_count(), 1);
    assert_eq!(
        state_machine.handle_event(SystemEvent::AccessPointFailed),
        StateTransition::Stay
    );
    assert_eq!(state_machine.get_retry_count(), 2);
    assert!(state_machine.should_retry());
    state_machine.handle_event(SystemEvent::AccessPointFailed);
    assert_eq!(
        state_machine.get_current_state(),
        SystemState::AccessPointError
    );
    assert!(state_machine.is_error_state());
    assert_eq!(
        state_machine.update().as_slice(),
        &[
            Action::LogError(SystemState::AccessPointError),
            Action::SystemRecover
        ]
    );
    println!("✅ Third failure enters {:?}", state_machine.get_current_state());

    println!("\n6. Recovery from the error state resets retries");
    state_machine.handle_event(SystemEvent::RecoveryRequested);
    assert_eq!(state_machine.get_current_state(), SystemState::Recovering);
    state_machine.handle_event(SystemEvent::RecoveryCompleted);
    assert_eq!(
        state_machine.get_current_state(),
        SystemState::AccessPointStarting
    );
    assert_eq!(state_machine.get_retry_count(), 0);
    assert_eq!(state_machine.get_recovery_count(), 2);
    println!("✅ Back to {:?}", state_machine.get_current_state());

    println!("\n7. Halt after repeated recoveries");
    loop {
        for _ in 0..3 {
            state_machine.handle_event(SystemEvent::AccessPointFailed);
        }
        assert_eq!(
            state_machine.get_current_state(),
            SystemState::AccessPointError
        );
        if state_machine.update().contains(&Action::Halt) {
            break;
        }
        state_machine.handle_event(SystemEvent::RecoveryRequested);
        state_machine.handle_event(SystemEvent::RecoveryCompleted);
    }
    assert_eq!(state_machine.get_recovery_count(), 5);
    println!(
        "✅ Halt requested after {} recoveries",
        state_machine.get_recovery_count()
    );

    println!("\n=== All state machine tests passed ===");

    loop {
        core::hint::spin_loop();
    }
}
