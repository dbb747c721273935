use embassy_stm32::gpio::Output;
use valve_core::{ActuatorLevel, OutputRef, ValveDriver};

use super::MAX_CIRCUITS;

/// Push-pull relay outputs, indexed by [`OutputRef`].
pub struct GpioValveDriver<'d> {
    outputs: [Output<'d>; MAX_CIRCUITS],
}

impl<'d> GpioValveDriver<'d> {
    pub fn new(outputs: [Output<'d>; MAX_CIRCUITS]) -> Self {
        Self { outputs }
    }
}

impl ValveDriver for GpioValveDriver<'_> {
    fn resolves(&self, output: OutputRef) -> bool {
        output.index() < self.outputs.len()
    }

    fn drive(&mut self, output: OutputRef, level: ActuatorLevel) {
        let Some(pin) = self.outputs.get_mut(output.index()) else {
            return;
        };
        match level {
            ActuatorLevel::High => pin.set_high(),
            ActuatorLevel::Low => pin.set_low(),
        }
        defmt::debug!("valves: out{} {}", output.index(), level.is_high());
    }
}
