use std::env;
use std::fs;
use std::path::PathBuf;

use bevy_volken::systems::noise::{NoiseFields, NoiseSettings, ScalarField};
use bevy_volken::CloudError;

// usage: noise_dump [out_dir] [seed]
fn main() -> Result<(), CloudError> {
    let mut args = env::args().skip(1);
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "noise_dump".to_string()));
    let seed = args.next().and_then(|s| s.parse().ok()).unwrap_or(0);

    let settings = NoiseSettings {
        seed,
        ..Default::default()
    };
    let fields = NoiseFields::synthesize(&settings);

    fs::create_dir_all(&out_dir)?;

    // a few slices through each volume, every channel of the flat fields
    let volumes: [(&str, &ScalarField); 2] = [("shape", &fields.shape), ("detail", &fields.detail)];
    for (name, field) in volumes {
        let depth = field.depth();
        for z in [0, depth / 4, depth / 2, depth - 1] {
            let path = out_dir.join(format!("{name}_z{z:03}.png"));
            field.slice_image(z, 0).save(&path)?;
            println!("wrote {}", path.display());
        }
    }

    let planes: [(&str, &ScalarField); 2] = [("weather", &fields.weather), ("blue_noise", &fields.blue_noise)];
    for (name, field) in planes {
        for channel in 0..field.channels() {
            let path = out_dir.join(format!("{name}_c{channel}.png"));
            field.slice_image(0, channel).save(&path)?;
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}
