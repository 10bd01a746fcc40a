/// Voltage ROC Poller
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
/// Connects to a ROC device described by a config file, prints the log
/// pointers, reads the configured parameters and streams alarms logged since
/// the given alarm pointer.
///
/// Usage: roc_poll <config.yml> [last_alarm_pointer]

use anyhow::{bail, Context};
use voltage_roc::protocol::ALARM_LOG_SIZE;
use voltage_roc::utils::OperationTimer;
use voltage_roc::{
    RocConfig, RocMaster, RocTransport, SerialTransport, StreamStep, TcpTransport, TransportConfig,
};

const RECENT_ALARMS: i16 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        bail!("usage: roc_poll <config.yml> [last_alarm_pointer]");
    };
    let last_alarm_pointer: Option<i16> = args
        .next()
        .map(|arg| arg.parse())
        .transpose()
        .context("last_alarm_pointer must be a number 0-239")?;

    let config = RocConfig::from_file(&config_path)
        .with_context(|| format!("failed to load config {}", config_path))?;

    println!("Voltage ROC Poller v{}", voltage_roc::VERSION);
    println!("=========================");

    match &config.transport {
        TransportConfig::Tcp { address, .. } => {
            println!("Connecting to {}...", address);
            let transport = TcpTransport::connect(address.as_str(), config.timeout())
                .await?
                .with_packet_logging(config.packet_logging);
            poll(transport, &config, last_alarm_pointer).await
        }
        TransportConfig::Serial { port, baud_rate, .. } => {
            println!("Opening {} at {} baud...", port, baud_rate);
            let transport = SerialTransport::open(port, *baud_rate, config.timeout())?
                .with_packet_logging(config.packet_logging);
            poll(transport, &config, last_alarm_pointer).await
        }
    }
}

async fn poll<T: RocTransport>(
    transport: T,
    config: &RocConfig,
    last_alarm_pointer: Option<i16>,
) -> anyhow::Result<()> {
    let mut master = RocMaster::from_config(transport, config)?;
    let settings = config.device;

    let pointers = master
        .get_history_pointers(&settings)
        .await
        .context("failed to read log pointers")?;
    println!("\nLog pointers:");
    println!("  alarm log:            {}", pointers.alarm_log_pointer);
    println!("  event log:            {}", pointers.event_log_pointer);
    println!("  hourly history index: {}", pointers.station_hourly_history_index);
    println!("  daily history index:  {}", pointers.station_daily_history_index);
    println!("  daily logs:           {}", pointers.daily_history_logs_count);
    println!("  hourly log days:      {}", pointers.hourly_history_logs_days);

    if !config.parameters.is_empty() {
        let timer = OperationTimer::start("read parameters");
        let values = master.get_parameters(&settings, &config.parameters).await;
        timer.stop_and_log(values.is_ok());

        println!("\nParameters:");
        for (name, value) in values? {
            println!("  {:<24} {}", name, value);
        }
    }

    // without a saved pointer show the most recent alarms
    let last = last_alarm_pointer
        .unwrap_or((pointers.alarm_log_pointer + ALARM_LOG_SIZE - RECENT_ALARMS) % ALARM_LOG_SIZE);
    let timer = OperationTimer::start("read alarms");
    let mut alarms = master.get_alarms(&settings, last, false).await?;

    println!("\nAlarms since pointer {}:", last);
    let mut count = 0usize;
    let truncated = loop {
        match alarms.next().await {
            StreamStep::Item(alarm) => {
                count += 1;
                println!(
                    "  {} {:<12} {:<12} {:>12.3}  {}",
                    alarm.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    alarm.tag,
                    alarm.set_or_clear,
                    alarm.value,
                    alarm.description
                );
            }
            StreamStep::Done => break false,
            StreamStep::Truncated => break true,
        }
    };
    timer.stop_and_log(!truncated);

    if truncated {
        println!("  ... alarm read stopped early after {} alarms", count);
    } else {
        println!("  {} alarms", count);
    }

    master.close().await?;
    Ok(())
}
