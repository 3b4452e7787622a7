#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::{error, info, trace, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::{PIO0, USB};
use embassy_rp::pio::Pio;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Timer};
use embassy_usb::class::cdc_acm::State;
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, Config as UsbConfig};
use joybus_core::{BitBus, BusDevice, DeviceState, PortRouter, Session};
use joybus_tas_rp2040::{
    configure_usb_cdc, enable_frame_irqs, HostClass, Outbox, PioOneLine, StatusLed, TimerClock,
    MAX_PACKET_SIZE,
};
use static_cell::StaticCell;
use tas_proto::{HostCommand, HostParser};

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => embassy_rp::pio::InterruptHandler<PIO0>;
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

/// How long the host task waits for a packet before running device updates.
const HOST_POLL_INTERVAL: Duration = Duration::from_millis(1);

type StatusPin = StatusLed<Output<'static>>;

/// Everything the bus interrupt owns.
struct BusContext {
    router: PortRouter<PioOneLine<'static>, TimerClock, BusDevice<'static>>,
    #[cfg(feature = "led-bus-activity")]
    led: StatusPin,
}

/// State shared by the bus interrupt and the host task.
static STATE: DeviceState = DeviceState::new();

/// Filled once during init, then only touched by `PIO0_IRQ_1`.
static BUS: Mutex<CriticalSectionRawMutex, RefCell<Option<BusContext>>> =
    Mutex::new(RefCell::new(None));

/// USB device configuration buffer.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// CDC-ACM state.
static CDC_STATE: StaticCell<State> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("joybus TAS starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    // --- Bus Setup ---
    let Pio {
        mut common,
        irq_flags,
        sm0,
        sm1,
        sm2,
        sm3,
        ..
    } = Pio::new(p.PIO0, Irqs);

    let pins = [
        common.make_pio_pin(p.PIN_6),
        common.make_pio_pin(p.PIN_7),
        common.make_pio_pin(p.PIN_26),
        common.make_pio_pin(p.PIN_27),
    ];
    let line = PioOneLine::new(&mut common, (sm0, sm1, sm2, sm3), irq_flags, pins);

    let led = StatusLed::new(Output::new(p.PIN_25, Level::Low));

    let context = BusContext {
        router: PortRouter::new(BitBus::new(line, TimerClock), BusDevice::new(&STATE)),
        #[cfg(feature = "led-bus-activity")]
        led,
    };
    BUS.lock(|slot| *slot.borrow_mut() = Some(context));

    enable_frame_irqs();
    interrupt::PIO0_IRQ_1.set_priority(Priority::P0);
    // SAFETY: the handler only touches `BUS`, which is fully initialised.
    unsafe { interrupt::PIO0_IRQ_1.enable() };

    // --- USB Setup ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(0x1209, 0x0001); // pid.codes test VID/PID
    usb_config.manufacturer = Some("Rust TAS");
    usb_config.product = Some("N64 joybus TAS controller");
    usb_config.serial_number = Some("001");
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    // Interface association descriptors, required for CDC on Windows
    usb_config.device_class = 0xEF;
    usb_config.device_sub_class = 0x02;
    usb_config.device_protocol = 0x01;
    usb_config.composite_with_iads = true;

    let config_descriptor = CONFIG_DESCRIPTOR.init([0; 256]);
    let bos_descriptor = BOS_DESCRIPTOR.init([0; 256]);
    let msos_descriptor = MSOS_DESCRIPTOR.init([0; 256]);
    let control_buf = CONTROL_BUF.init([0; 64]);

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
    );

    let cdc_state = CDC_STATE.init(State::new());
    let class = configure_usb_cdc(&mut builder, cdc_state);

    let usb_device = builder.build();

    #[cfg(feature = "led-datastream-status")]
    let host_led = Some(led);
    #[cfg(not(feature = "led-datastream-status"))]
    let host_led = None;
    #[cfg(not(any(feature = "led-datastream-status", feature = "led-bus-activity")))]
    drop(led);

    // Spawn tasks (unwrap the SpawnToken, then spawn)
    spawner.spawn(usb_task(usb_device)).unwrap();
    spawner.spawn(host_task(class, host_led)).unwrap();

    info!("joybus TAS initialized, waiting for host...");
}

#[interrupt]
unsafe fn PIO0_IRQ_1() {
    BUS.lock(|slot| {
        let mut slot = slot.borrow_mut();
        let Some(context) = slot.as_mut() else {
            return;
        };

        #[cfg(feature = "led-bus-activity")]
        context.led.set(true);

        if let Some(port) = context.router.on_interrupt() {
            trace!("Frame on port {}", port.number() + 1);
        }

        #[cfg(feature = "led-bus-activity")]
        context.led.set(false);
    });
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, Driver<'static, USB>>) {
    device.run().await;
}

/// Host task - parses host commands and runs the device session.
#[embassy_executor::task]
async fn host_task(mut class: HostClass<'static>, mut led: Option<StatusPin>) {
    let mut parser = HostParser::new();
    let mut session = Session::new(&STATE);
    let mut outbox = Outbox::new();

    loop {
        class.wait_connection().await;
        info!("Host connected");

        parser.reset();
        outbox.clear();

        match serve_host(&mut class, &mut parser, &mut session, &mut outbox, &mut led).await {
            Err(EndpointError::Disconnected) => info!("Host disconnected"),
            Err(e) => error!("USB error: {:?}", e),
            Ok(()) => {}
        }
    }
}

/// Exchange messages with a connected host until the link fails.
async fn serve_host(
    class: &mut HostClass<'static>,
    parser: &mut HostParser,
    session: &mut Session<'static>,
    outbox: &mut Outbox,
    led: &mut Option<StatusPin>,
) -> Result<(), EndpointError> {
    let mut packet = [0u8; MAX_PACKET_SIZE as usize];

    loop {
        if let Err(e) = session.update(outbox) {
            warn!("Device update failed: {:?}", e);
        }
        if let Some(led) = led.as_mut() {
            led.set(session.flow().is_pending());
        }

        if let Err(e) = outbox.flush(class).await {
            error!("Host write failed: {:?}", e);
            return Err(e);
        }

        let read = select(class.read_packet(&mut packet), Timer::after(HOST_POLL_INTERVAL));
        let received = match read.await {
            Either::First(read) => read?,
            Either::Second(()) => continue,
        };

        for &byte in &packet[..received] {
            match parser.push_byte(byte) {
                Ok(Some(cmd)) => {
                    let before = session.kind();
                    if let Err(e) = session.handle(&cmd, outbox) {
                        warn!("Host command failed: {:?}", e);
                    }
                    if matches!(cmd, HostCommand::SetDevice { .. }) && session.kind() != before {
                        info!("Device changed to {:?}", session.kind());
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("Host parse error: {:?}", err);
                    if let Err(e) = session.report_parse_error(err, outbox) {
                        warn!("Host warning dropped: {:?}", e);
                    }
                }
            }
        }
    }
}
