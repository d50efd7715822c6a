use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context as ErrorContext, Result};

use crate::layouts::Layout;
use crate::simulation::PhonePosition;

fn write_file(path: &Path, content: &str) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Write one scene file per layout into `out_dir`.
///
/// All layouts are written when `layouts` is empty. Existing files are only
/// replaced with `force`.
pub fn generate(
    out_dir: &Path,
    range: f64,
    phone: PhonePosition,
    layouts: &[Layout],
    force: bool,
) -> Result<()> {
    let layouts = if layouts.is_empty() {
        Layout::ALL.to_vec()
    } else {
        layouts.to_vec()
    };

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Could not create folder '{}'", out_dir.display()))?;

    if !force {
        layouts
            .iter()
            .try_for_each(|layout| {
                let path = out_dir.join(format!("{}.txt", layout.file_stem()));
                if path.exists() {
                    bail!("Found an already existing '{}' file", path.display())
                }

                Ok(())
            })
            .with_context(|| "Could not generate scenes in this folder, use --force to overwrite")?;
    }

    for layout in layouts {
        let path = out_dir.join(format!("{}.txt", layout.file_stem()));
        let scene = layout.scene(range, phone);
        write_file(&path, &scene.to_string())
            .with_context(|| format!("Could not create '{}'", path.display()))?;

        println!(
            "Wrote {} with {} people",
            path.display(),
            scene.agent_count()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::files::SceneFile;
    use crate::layouts::Layout;
    use crate::simulation::PhonePosition;

    use super::generate;

    #[test]
    fn writes_parsable_scenes() {
        let dir = tempfile::tempdir().unwrap();
        generate(dir.path(), 16.0, PhonePosition::InHand, &[], false).unwrap();

        for layout in Layout::ALL {
            let path = dir.path().join(format!("{}.txt", layout.file_stem()));
            let scene = SceneFile::load(&path).unwrap();
            assert_eq!(scene.agent_count() as usize, layout.people().len());
            assert_eq!(scene.agents[&0].position, Some(PhonePosition::InHand));
        }
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let layouts = [Layout::Conference];
        generate(dir.path(), 16.0, PhonePosition::InHand, &layouts, false).unwrap();
        assert!(generate(dir.path(), 16.0, PhonePosition::InHand, &layouts, false).is_err());
        assert!(generate(dir.path(), 16.0, PhonePosition::InHand, &layouts, true).is_ok());
    }
}
