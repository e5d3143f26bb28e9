use console::Style;
use oblique_core::pipeline::{AcquisitionOutcome, PipelineConfig, PipelineReport, View};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    ok: Style,
    failed: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            ok: Style::new().green().bold(),
            failed: Style::new().red().bold(),
        }
    }
}

pub fn print_run_summary(config: &PipelineConfig, device_name: &str) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Oblique Pipeline"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(16)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(config.input.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output_path().display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Device"),
        s.method.apply_to(device_name)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Memory"),
        s.value.apply_to(config.memory)
    );
    println!();

    println!("  {}", s.header.apply_to("Geometry"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("View"),
        s.method.apply_to(config.view)
    );
    if config.view != View::Raw {
        match config.tilt_deg {
            Some(tilt) => println!(
                "    {:<12}{}",
                s.label.apply_to("Tilt"),
                s.value.apply_to(format!("{tilt} deg"))
            ),
            None => println!(
                "    {:<12}{}",
                s.label.apply_to("Tilt"),
                s.disabled.apply_to("from metadata")
            ),
        }
        println!(
            "    {:<12}{}",
            s.label.apply_to("Direction"),
            s.value.apply_to(format!("{:?}", config.direction))
        );
    }
    if config.view == View::Traditional {
        if config.rotate {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Rotate"),
                s.value.apply_to(format!("crop {:?}", config.crop_anchor))
            );
        } else {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Rotate"),
                s.disabled.apply_to("disabled")
            );
        }
    }
    println!();
}

pub fn print_report(report: &PipelineReport) {
    let s = Styles::new();
    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Input shape"),
        s.value.apply_to(report.input_shape)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output shape"),
        s.value.apply_to(report.output_shape)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Mode"),
        s.value.apply_to(if report.streamed { "streamed" } else { "in memory" })
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Elapsed"),
        s.value.apply_to(format!("{:.1} s", report.elapsed.as_secs_f64()))
    );
    println!();
    println!("Output saved to {}", s.path.apply_to(report.output.display()));
}

pub fn print_batch_summary(outcomes: &[AcquisitionOutcome], total: usize) {
    let s = Styles::new();
    println!();
    println!("  {}", s.header.apply_to("Batch"));
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => println!(
                "    {} {} -> {}",
                s.ok.apply_to("ok    "),
                outcome.input.display(),
                s.path.apply_to(report.output.display())
            ),
            Err(e) => println!(
                "    {} {}: {e}",
                s.failed.apply_to("failed"),
                outcome.input.display()
            ),
        }
    }
    if outcomes.len() < total {
        println!(
            "    {}",
            s.disabled
                .apply_to(format!("{} not started", total - outcomes.len()))
        );
    }
    println!();
}
