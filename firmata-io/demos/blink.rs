//! Blinks the embedded led on pin 13 as per the Arduino tutorial:
//! https://docs.arduino.cc/built-in-examples/basics/Blink/

use firmata_io::errors::Error;
use firmata_io::hardware::Board;
use firmata_io::io::PinModeId;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Connect to the board on the first available serial port.
    let board = Board::default().setup().await?;
    println!("{}", board);

    let led = board.pin(13)?;
    led.pin_mode(PinModeId::OUTPUT).await?;

    loop {
        led.digital_write(true).await?;
        tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
        led.digital_write(false).await?;
        tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
    }
}
