//! Single-port CDC ACM device carrying the operator console.
//!
//! Owns the Embassy USB builder bookkeeping and hands the console port's
//! split handles to the USB task.

pub const MAX_PACKET_SIZE: u16 = 64;
const CONTROL_PACKET_SIZE: u8 = 64;

const CONTROL_BUFFER_LEN: usize = 64;
const CONFIG_DESCRIPTOR_LEN: usize = 256;
const BOS_DESCRIPTOR_LEN: usize = 256;
const MSOS_DESCRIPTOR_LEN: usize = 128;

/// User-visible strings advertised in the USB descriptors.
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceStrings {
    pub manufacturer: &'static str,
    pub product: &'static str,
    /// Unique serial number string descriptor (optional).
    pub serial_number: Option<&'static str>,
}

impl Default for UsbDeviceStrings {
    fn default() -> Self {
        Self {
            manufacturer: "Valve Sequencer",
            product: "Heating Valve Controller",
            serial_number: None,
        }
    }
}

/// Backing storage for the Embassy USB builder and the CDC ACM class.
pub struct UsbDeviceStorage {
    control_buf: [u8; CONTROL_BUFFER_LEN],
    config_descriptor: [u8; CONFIG_DESCRIPTOR_LEN],
    bos_descriptor: [u8; BOS_DESCRIPTOR_LEN],
    msos_descriptor: [u8; MSOS_DESCRIPTOR_LEN],
    console_state: embassy_usb::class::cdc_acm::State<'static>,
}

impl UsbDeviceStorage {
    pub fn new() -> Self {
        Self {
            control_buf: [0; CONTROL_BUFFER_LEN],
            config_descriptor: [0; CONFIG_DESCRIPTOR_LEN],
            bos_descriptor: [0; BOS_DESCRIPTOR_LEN],
            msos_descriptor: [0; MSOS_DESCRIPTOR_LEN],
            console_state: embassy_usb::class::cdc_acm::State::new(),
        }
    }
}

/// Split handles for the console CDC ACM interface.
pub struct CdcAcmHandle<D: embassy_usb::driver::Driver<'static>> {
    pub sender: embassy_usb::class::cdc_acm::Sender<'static, D>,
    pub receiver: embassy_usb::class::cdc_acm::Receiver<'static, D>,
    pub control: embassy_usb::class::cdc_acm::ControlChanged<'static>,
}

/// USB device plus the not-yet-claimed console port.
pub struct UsbConsole<D>
where
    D: embassy_usb::driver::Driver<'static>,
{
    pub device: embassy_usb::UsbDevice<'static, D>,
    console: Option<CdcAcmHandle<D>>,
}

impl<D> UsbConsole<D>
where
    D: embassy_usb::driver::Driver<'static>,
{
    pub fn new(
        driver: D,
        storage: &'static mut UsbDeviceStorage,
        strings: UsbDeviceStrings,
    ) -> Self {
        let mut config = embassy_usb::Config::new(0x1209, 0x0001);
        config.manufacturer = Some(strings.manufacturer);
        config.product = Some(strings.product);
        config.serial_number = strings.serial_number;
        config.max_packet_size_0 = CONTROL_PACKET_SIZE;
        config.max_power = 100;

        let mut builder = embassy_usb::Builder::new(
            driver,
            config,
            &mut storage.config_descriptor,
            &mut storage.bos_descriptor,
            &mut storage.msos_descriptor,
            &mut storage.control_buf,
        );

        let class = embassy_usb::class::cdc_acm::CdcAcmClass::new(
            &mut builder,
            &mut storage.console_state,
            MAX_PACKET_SIZE,
        );
        let (sender, receiver, control) = class.split_with_control();

        Self {
            device: builder.build(),
            console: Some(CdcAcmHandle {
                sender,
                receiver,
                control,
            }),
        }
    }

    /// Takes ownership of the console CDC handles.
    pub fn take_console(&mut self) -> Option<CdcAcmHandle<D>> {
        self.console.take()
    }
}
