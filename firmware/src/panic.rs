use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    defmt::error!("panic: {}", defmt::Display2Format(info));
    // Relays fall back to their reset level once the core stops.
    cortex_m::asm::udf();
}
