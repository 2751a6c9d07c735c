use anyhow::Result;

pub fn init() -> Result<ctrlc2::AsyncCtrlC> {
    let ctrlc = ctrlc2::AsyncCtrlC::new(move || {
        log::info!("Ctrl-C received! Ready to exiting...");
        true
    })
    .map_err(|e| anyhow::anyhow!("failed to install ctrl-c handler: {e}"))?;
    Ok(ctrlc)
}
