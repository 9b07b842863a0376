use anyhow::{anyhow, Result};
use rdma::device::DeviceList;

fn main() -> Result<()> {
    let dev_list = DeviceList::available()?;

    if dev_list.is_empty() {
        return Err(anyhow!("No available rdma devices"));
    }

    for dev in dev_list.iter() {
        println!("{}\tguid={:x}", dev.name(), dev.guid());
    }

    Ok(())
}
