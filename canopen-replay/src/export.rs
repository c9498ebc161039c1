use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use canopen_decode::BusManager;
use chrono::Local;
use csv::Writer;
use log::info;

/// Writes every recorded value of every node as one CSV row.
pub fn write_history<W: Write>(bus: &BusManager, writer: &mut Writer<W>) -> Result<usize, csv::Error> {
    writer.write_record(["Channel", "Node", "Address", "Timestamp", "Value"])?;

    let mut rows = 0;
    for channel in bus.channels() {
        for node in channel.nodes() {
            for (index, sub, slot) in node.objects().iter() {
                for (timestamp, value) in slot.history() {
                    writer.write_record([
                        channel.id().to_string(),
                        node.node_id().to_string(),
                        format!("{:04X}:{:02X}", index, sub),
                        format!("{:.6}", timestamp),
                        value.to_string(),
                    ])?;
                    rows += 1;
                }
            }
        }
    }
    writer.flush()?;
    Ok(rows)
}

/// Exports into a new timestamped file under `directory`.
pub fn export_csv(bus: &BusManager, directory: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    fs::create_dir_all(directory)?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let export_path = directory.join(format!("canopen_decode_{}.csv", timestamp));

    let mut writer = Writer::from_writer(File::create(&export_path)?);
    let rows = write_history(bus, &mut writer)?;
    info!("Exported {} values to {}", rows, export_path.display());
    Ok(export_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopen_decode::TraceFormat;

    #[test]
    fn test_history_rows() {
        let mut bus = BusManager::new();
        let trace = "(0.5) 2 585#4B00200034120000\n(0.7) 2 585#4F00200107000000\n";
        bus.replay_trace(trace.as_bytes(), TraceFormat::Generic, None);

        let mut writer = Writer::from_writer(Vec::new());
        assert_eq!(write_history(&bus, &mut writer).unwrap(), 2);
        let text = String::from_utf8(writer.get_ref().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Channel,Node,Address,Timestamp,Value");
        assert_eq!(lines[1], "2,5,2000:00,0.500000,\"[34, 12]\"");
        assert_eq!(lines[2], "2,5,2000:01,0.700000,[07]");
    }
}
