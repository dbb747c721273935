use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use static_cell::StaticCell;

use crate::usb;
use crate::valves::{CommandQueue, GpioValveDriver, ValveGroup};

mod console_task;
mod sequencer_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static COMMAND_QUEUE: CommandQueue = CommandQueue::new();
pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA6,
        PA7,
        PB3,
        PB4,
        PB5,
        PB6,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(config);

    // Relays idle de-energised until the sequencer drives the closed level.
    let driver = GpioValveDriver::new([
        Output::new(PA0, Level::Low, Speed::Low),
        Output::new(PA1, Level::Low, Speed::Low),
        Output::new(PA6, Level::Low, Speed::Low),
        Output::new(PA7, Level::Low, Speed::Low),
        Output::new(PB3, Level::Low, Speed::Low),
        Output::new(PB4, Level::Low, Speed::Low),
        Output::new(PB5, Level::Low, Speed::Low),
        Output::new(PB6, Level::Low, Speed::Low),
    ]);

    let group = match ValveGroup::new(driver) {
        Ok(group) => group,
        Err(error) => defmt::panic!(
            "valve configuration rejected: {}",
            defmt::Display2Format(&error)
        ),
    };

    spawner.spawn(defmt::unwrap!(sequencer_task::run(group)));
    spawner.spawn(defmt::unwrap!(usb_task::run(USB, PA12, PA11)));
    spawner.spawn(defmt::unwrap!(console_task::run()));

    core::future::pending::<()>().await;
}
