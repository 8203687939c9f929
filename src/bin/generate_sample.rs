use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use asad::config::{Config, ModelConfig, ObservationConfig, ReddeningConfig};
use asad::data::loader::{write_model_text, write_text};
use asad::data::reddening::extinction_curve;
use asad::{Model, ParameterGrid, Spectrum, StatTest};
use ndarray::{Array1, Array2};
use parquet::arrow::ArrowWriter;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Balmer and Ca II lines (Å) carved into the continuum.
const LINES: [f64; 6] = [3934.0, 3970.0, 4102.0, 4340.0, 4861.0, 6563.0];

/// Continuum that flattens with age, absorption strongest near log(age) 8.5.
fn model_flux(wavelength: &Array1<f64>, log_age: f64) -> Array1<f64> {
    let slope = 2.0 - 0.3 * (log_age - 6.6);
    let depth = 0.35 * (-((log_age - 8.5) / 1.2).powi(2)).exp();
    wavelength.mapv(|wl| {
        let continuum = (wl / 5000.0).powf(-slope);
        let absorption: f64 = LINES.iter().map(|&mu| gaussian(wl, mu, 8.0, depth)).sum();
        continuum * (1.0 - absorption)
    })
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn write_parquet(path: &Path, model: &Model) {
    let ages = model.ages();
    let mut fields = vec![Field::new("wavelength", DataType::Float64, false)];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(Float64Array::from(
        model.spectrum.wavelength().to_vec(),
    ))];
    for (age, row) in ages.iter().zip(model.spectrum.flux().rows()) {
        fields.push(Field::new(format!("age_{age:.2}"), DataType::Float64, false));
        columns.push(Arc::new(Float64Array::from(row.to_vec())));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).expect("Failed to create RecordBatch");
    let file = std::fs::File::create(path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");
}

fn main() {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    // Wavelengths: 3500 → 6998 Å, step 2
    let wavelength: Array1<f64> = (0..1750).map(|i| 3500.0 + i as f64 * 2.0).collect();

    let age_grid = ParameterGrid::new(6.6, 0.05);
    let num_ages = 61;
    let mut flux = Array2::zeros((num_ages, wavelength.len()));
    for (k, mut row) in flux.rows_mut().into_iter().enumerate() {
        row.assign(&model_flux(&wavelength, age_grid.value(k)));
    }
    let model = Model::new(
        Spectrum::new(wavelength.clone(), flux).expect("model grid is valid"),
        age_grid,
    );

    // Observation: model age index 30 dimmed by E(B-V) = 0.12, plus noise.
    let true_index = 30;
    let true_reddening = 0.12;
    let z = extinction_curve(&wavelength);
    let observed: Array1<f64> = model
        .spectrum
        .flux()
        .row(true_index)
        .iter()
        .zip(z.iter())
        .map(|(&f, &zi)| f * 10f64.powf(-0.4 * 3.2 * zi * true_reddening) + rng.gauss(0.0, 0.002))
        .collect();
    let n = observed.len();
    let observation = Spectrum::new(
        wavelength,
        observed.into_shape_with_order((1, n)).expect("single row"),
    )
    .expect("observation grid is valid");

    write_model_text(Path::new("sample_model.txt"), &model).expect("Failed to write model");
    write_text(Path::new("sample_observation.txt"), &observation).expect("Failed to write observation");
    write_parquet(Path::new("sample_model.parquet"), &model);

    let config = Config {
        observation: ObservationConfig {
            path: "sample_observation.txt".into(),
            wavelength_start: Some(3600.0),
            wavelength_end: Some(6800.0),
            preserve_first_sample: false,
            reddening: Some(ReddeningConfig { max: 0.3, step: 0.01 }),
        },
        model: ModelConfig {
            path: "sample_model.txt".into(),
            age: age_grid,
            row_stride: None,
        },
        interp: Some(4.0),
        normalize_wavelength: Some(5500.0),
        stat_test: StatTest::ChiSquared,
        delta: 1.0,
    };
    let json = serde_json::to_string_pretty(&config).expect("config serializes");
    std::fs::write("sample_config.json", json).expect("Failed to write config");

    println!(
        "Wrote {} model spectra and 1 observation ({} wavelengths each); expected age {:.2}, reddening {true_reddening}",
        num_ages,
        n,
        age_grid.value(true_index)
    );
}
