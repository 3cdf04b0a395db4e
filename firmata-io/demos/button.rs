//! Demonstrates the simple usage of a push button on pin 2 as per the
//! Arduino tutorial:
//! https://docs.arduino.cc/built-in-examples/digital/Button/

use firmata_io::errors::Error;
use firmata_io::hardware::Board;
use firmata_io::io::PinModeId;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let board = Board::default().setup().await?;

    let button = board.pin(2)?;
    button.pin_mode(PinModeId::INPUT).await?;

    // Triggered on every button state change.
    button
        .set_callback(|event| async move {
            match event.value {
                0 => println!("Push button released"),
                _ => println!("Push button pressed"),
            }
        })
        .await?;
    button.set_reporting(true).await?;

    // Reports arrive in the background: watch the button for 30 seconds.
    tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
    board.close().await?;
    Ok(())
}
