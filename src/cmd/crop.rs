use anyhow::Result;

use shortsmith::compute_crop;

pub fn cmd_crop(width: u32, height: u32) -> Result<()> {
    let rect = compute_crop(width, height);
    println!("{}", serde_json::to_string(&rect)?);
    Ok(())
}
