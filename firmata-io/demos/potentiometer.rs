//! Demonstrates the simple usage of an analog sensor: a potentiometer on
//! pin A0, as per the Arduino tutorial:
//! https://docs.arduino.cc/built-in-examples/analog/AnalogInput/

use firmata_io::errors::Error;
use firmata_io::hardware::Board;
use firmata_io::io::{PinAddress, PinModeId};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let board = Board::default().setup().await?;

    let potentiometer = board.pin(PinAddress::Analog(0))?;
    potentiometer.pin_mode(PinModeId::ANALOG).await?;

    // Triggered on every value change.
    potentiometer
        .set_callback(|event| async move {
            println!("Sensor value changed: {}", event.value);
        })
        .await?;

    // One report every 100ms is plenty for a knob.
    board.set_sampling_interval(100).await?;
    potentiometer.set_reporting(true).await?;

    tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
    board.close().await?;
    Ok(())
}
