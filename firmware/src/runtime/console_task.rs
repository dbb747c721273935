use embassy_futures::select::{Either, select};

use super::COMMAND_QUEUE;
use crate::console::{
    CONSOLE_LINK, CONSOLE_RX_QUEUE, CONSOLE_TX_QUEUE, ChannelControl, ConsoleOutput,
    ConsoleSession, SessionError,
};

#[embassy_executor::task]
pub async fn run() -> ! {
    let rx_queue = CONSOLE_RX_QUEUE.receiver();
    let tx_queue = CONSOLE_TX_QUEUE.sender();
    let mut session = ConsoleSession::new(ChannelControl::new(COMMAND_QUEUE.sender()));
    let mut output = ConsoleOutput::new();

    loop {
        match select(CONSOLE_LINK.wait(), rx_queue.receive()).await {
            Either::First(true) => {
                if session.on_connect(&mut output).is_err() {
                    defmt::warn!("console: greeting truncated");
                }
            }
            Either::First(false) => session.on_disconnect(),
            Either::Second(frame) => {
                for byte in frame {
                    match session.ingest(byte, &mut output) {
                        Ok(()) | Err(SessionError::Command(_)) => {}
                        Err(error) => {
                            defmt::warn!("console: {}", defmt::Display2Format(&error));
                        }
                    }
                }
            }
        }

        if output.is_empty() {
            continue;
        }
        for frame in output.frames() {
            tx_queue.send(frame).await;
        }
        output.clear();
    }
}
