//! Output filenames that record the parameters they were generated with.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::plan::LayerHeightRule;
use crate::Mm;

/// Filename-safe rendering of a parameter: shortest round-trip digits (whole numbers keep their
/// `.0`), `.` becomes `p` and a minus sign becomes `neg`. `0.35` -> `0p35`, `-0.05` -> `neg0p05`.
pub fn filename_number(value: Mm) -> String {
    // {:?} keeps "1.0" where {} would print "1"
    let s = format!("{:?}", value).replace('.', "p");
    if value < 0.0 {
        s.replacen('-', "neg", 1)
    } else {
        // -0.0
        s.trim_start_matches('-').to_owned()
    }
}

// block growth: <initial>_<delta>_<stem>.nc, rescale: <new height>_<input file name>
pub fn output_filename(input: &Path, rule: &LayerHeightRule) -> PathBuf {
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    let name: OsString = match rule {
        LayerHeightRule::BlockGrowth(growth) => {
            let stem = input.file_stem().unwrap_or_default();
            let mut name = OsString::from(format!(
                "{}_{}_",
                filename_number(growth.initial_height),
                filename_number(growth.delta_per_block)
            ));
            name.push(stem);
            name.push(".nc");
            name
        }
        LayerHeightRule::Rescale { new_height } => {
            let mut name = OsString::from(format!("{}_", filename_number(*new_height)));
            name.push(input.file_name().unwrap_or_default());
            name
        }
    };
    dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::BlockGrowth;

    #[test]
    fn numbers() {
        assert_eq!(filename_number(0.35), "0p35");
        assert_eq!(filename_number(1.0), "1p0");
        assert_eq!(filename_number(0.125), "0p125");
        assert_eq!(filename_number(-0.05), "neg0p05");
        assert_eq!(filename_number(0.0), "0p0");
        assert_eq!(filename_number(-0.0), "0p0");
    }

    #[test]
    fn block_growth_name() {
        let rule = LayerHeightRule::BlockGrowth(BlockGrowth {
            layers_per_block: 15,
            initial_height: 0.35,
            delta_per_block: -0.02,
        });
        assert_eq!(
            output_filename(Path::new("/prints/vase.gcode"), &rule),
            PathBuf::from("/prints/0p35_neg0p02_vase.nc")
        );
    }

    #[test]
    fn rescale_name_keeps_extension() {
        let rule = LayerHeightRule::Rescale { new_height: 0.2 };
        assert_eq!(
            output_filename(Path::new("/prints/vase.nc"), &rule),
            PathBuf::from("/prints/0p2_vase.nc")
        );
        assert_eq!(output_filename(Path::new("vase.nc"), &rule), PathBuf::from("0p2_vase.nc"));
    }
}
