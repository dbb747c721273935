use embassy_futures::select::{Either, select};
use embassy_time::Ticker;

use super::COMMAND_QUEUE;
use crate::valves::{GpioValveDriver, TICK_PERIOD, ValveGroup, embassy_duration};

/// Owns the sequencer: applies queued commands and ticks it at a fixed period.
#[embassy_executor::task]
pub async fn run(mut group: ValveGroup<GpioValveDriver<'static>>) -> ! {
    let commands = COMMAND_QUEUE.receiver();
    let mut ticker = Ticker::every(embassy_duration(TICK_PERIOD));

    loop {
        match select(commands.receive(), ticker.next()).await {
            // Outcomes and rejections are logged by the group.
            Either::First(command) => {
                let _ = group.apply(command);
            }
            Either::Second(()) => {
                let _ = group.tick(TICK_PERIOD);
            }
        }
    }
}
