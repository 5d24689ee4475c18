use anyhow::{Context, Result};
use soundstrip::agc::Policy;
use soundstrip::audio::{BlockSource, Capture, PcmReader};
use soundstrip::color::ColorField;
use soundstrip::shape::{Curve, WeightCurve};
use soundstrip::spectrum::whole_steps;
use soundstrip::transport::{self, Encoding, Transport};
use soundstrip::{Config, Pipeline, Strategy};
use std::fs::File;
use std::io::{self, Write};
use std::str::FromStr;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args();
    let config = config_from(&args)?;
    let (rate, block, encoding) = (config.sample_rate, config.block_len, config.encoding);
    let mut pipeline = Pipeline::new(config).context("invalid configuration")?;

    let device = args.value_of("device").unwrap(); // has a default
    let writer: Box<dyn Write> = if device == "-" {
        Box::new(io::stdout())
    } else {
        Box::new(transport::open_serial(device)
            .with_context(|| format!("cannot open {}", device))?)
    };
    let mut link = Transport::new(writer, encoding);
    let preview = args.is_present("preview");

    #[cfg(feature = "jack")]
    {
        if args.is_present("jack") {
            let mut source = soundstrip::audio::JackSource::open("soundstrip", block)
                .context("cannot start jack client")?;
            let frames = pipeline.run(&mut source, &mut link, preview)?;
            log::info!("rendered {} frames", frames);
            return Ok(());
        }
    }

    let channels = usize::from_str(args.value_of("channels").unwrap())?;
    let input = args.value_of("input").unwrap();
    let source: Box<dyn BlockSource + Send> = if input == "-" {
        Box::new(PcmReader::new(io::stdin(), channels, block, rate)?)
    } else {
        let file = File::open(input).with_context(|| format!("cannot open {}", input))?;
        Box::new(PcmReader::new(file, channels, block, rate)?)
    };
    let queue = pipeline.capture_queue();
    let frames = if queue > 0 {
        pipeline.run(&mut Capture::spawn(source, queue), &mut link, preview)?
    } else {
        let mut source = source;
        pipeline.run(&mut source, &mut link, preview)?
    };
    log::info!("rendered {} frames", frames);
    Ok(())
}

fn config_from(args: &clap::ArgMatches) -> Result<Config> {
    // every value below has a default and passed its validator
    let value = |name: &str| args.value_of(name).unwrap();
    let leds = usize::from_str(value("leds"))?;
    let brightness = f32::from_str(value("brightness"))?;
    let strategy = match value("strategy") {
        // A1 upwards by whole steps, one note per LED
        "notes" => Strategy::Correlation(whole_steps(13, leds)),
        _ => Strategy::Transform,
    };
    let decimation = if args.occurrences_of("decimation") == 0 && strategy != Strategy::Transform {
        1
    } else {
        usize::from_str(value("decimation"))?
    };
    let curve = match value("curve") {
        "compress" => Curve::Compress,
        _ => Curve::Power {
            exponent: f32::from_str(value("exponent"))?,
            expected_max: 1.0 / leds as f32,
        },
    };
    Ok(Config {
        sample_rate: u32::from_str(value("rate"))?,
        block_len: usize::from_str(value("block"))?,
        leds,
        strategy,
        decimation,
        noise_floor: f32::from_str(value("noise"))?,
        compensation: if args.is_present("compensate") { Some(0.9) } else { None },
        agc: match value("agc") {
            "channel" => Policy::PerChannel,
            "peak" => Policy::Peak,
            _ => Policy::Average,
        },
        agc_falloff: f32::from_str(value("agc_falloff"))?,
        smoothing: f32::from_str(value("smoothing"))?,
        weighting: if args.is_present("weighting") { Some(WeightCurve::hearing()) } else { None },
        curve,
        gain: f32::from_str(value("gain"))? * brightness,
        cap: u8::from_str(value("cap"))?,
        colors: match value("colors") {
            "sphere" => ColorField::sphere(),
            _ => ColorField::default(),
        },
        encoding: match value("encoding") {
            "plain" => Encoding::Plain,
            _ => Encoding::Addressed,
        },
        capture_queue: usize::from_str(value("queue"))?,
    })
}

fn is_positive_int(s: String) -> Result<(), String> {
    match usize::from_str(&s) {
        Ok(n) if n > 0 => Ok(()),
        _ => Err(format!("{} is not a positive integer", s)),
    }
}

fn is_falloff(s: String) -> Result<(), String> {
    match f32::from_str(&s) {
        Ok(f) if f > 0.0 && f < 1.0 => Ok(()),
        Ok(_) => Err("falloff must be between (0, 1)".to_string()),
        Err(_) => Err("falloff should be a float".to_string()),
    }
}

fn is_non_negative(s: String) -> Result<(), String> {
    match f32::from_str(&s) {
        Ok(f) if f >= 0.0 => Ok(()),
        _ => Err(format!("{} is not a non-negative number", s)),
    }
}

fn parse_args<'a>() -> clap::ArgMatches<'a> {
    app().get_matches()
}

fn app<'a, 'b>() -> clap::App<'a, 'b> {
    let app = clap::App::new("soundstrip")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Turns the sound in the room into an ambient light show on an LED strip")
        .arg(
            clap::Arg::with_name("device")
                .short("d")
                .long("device")
                .value_name("PATH")
                .help("Serial device of the LED controller, - for stdout")
                .default_value("/dev/ttyACM0")
        )
        .arg(
            clap::Arg::with_name("input")
                .short("i")
                .long("input")
                .value_name("PATH")
                .help("Raw signed 16-bit little-endian PCM, - for stdin (e.g. arecord -f S16_LE -c 2 -r 44100 -t raw)")
                .default_value("-")
        )
        .arg(
            clap::Arg::with_name("channels")
                .short("c")
                .long("channels")
                .value_name("N")
                .help("Interleaved channels in the PCM input, mixed down to mono")
                .default_value("2")
                .validator(is_positive_int)
        )
        .arg(
            clap::Arg::with_name("rate")
                .short("r")
                .long("rate")
                .value_name("HZ")
                .default_value("44100")
                .validator(is_positive_int)
        )
        .arg(
            clap::Arg::with_name("block")
                .long("block")
                .value_name("SAMPLES")
                .help("Samples analyzed per frame")
                .default_value("512")
                .validator(is_positive_int)
        )
        .arg(
            clap::Arg::with_name("leds")
                .short("n")
                .long("leds")
                .value_name("COUNT")
                .default_value("32")
                .validator(is_positive_int)
        )
        .arg(
            clap::Arg::with_name("strategy")
                .short("s")
                .long("strategy")
                .value_name("STRATEGY")
                .help("Full spectrum transform, or one musical note per LED")
                .possible_values(&["transform", "notes"])
                .default_value("transform")
        )
        .arg(
            clap::Arg::with_name("decimation")
                .long("decimation")
                .value_name("FACTOR")
                .help("Only use the lowest 1/FACTOR of the spectrum (defaults to 1 for notes)")
                .default_value("8")
                .validator(is_positive_int)
        )
        .arg(
            clap::Arg::with_name("noise")
                .long("noise")
                .value_name("AMOUNT")
                .help("White noise floor added before normalization, keeps a quiet room dark")
                .default_value("5.0")
                .validator(is_non_negative)
        )
        .arg(
            clap::Arg::with_name("compensate")
                .long("compensate")
                .help("Even out a microphone that hears some bands much louder than others")
        )
        .arg(
            clap::Arg::with_name("agc")
                .long("agc")
                .value_name("POLICY")
                .possible_values(&["average", "channel", "peak"])
                .default_value("average")
        )
        .arg(
            clap::Arg::with_name("agc_falloff")
                .long("agc-falloff")
                .value_name("F")
                .help("Closer to 1 adapts to volume changes more slowly")
                .default_value("0.8")
                .validator(is_falloff)
        )
        .arg(
            clap::Arg::with_name("smoothing")
                .long("smoothing")
                .value_name("F")
                .default_value("0.8")
                .validator(is_falloff)
        )
        .arg(
            clap::Arg::with_name("weighting")
                .long("weighting")
                .help("Weight bands by a rough equal-loudness curve")
        )
        .arg(
            clap::Arg::with_name("curve")
                .long("curve")
                .value_name("CURVE")
                .possible_values(&["power", "compress"])
                .default_value("power")
        )
        .arg(
            clap::Arg::with_name("exponent")
                .long("exponent")
                .value_name("P")
                .help("Exponent of the power curve")
                .default_value("2.0")
                .validator(is_non_negative)
        )
        .arg(
            clap::Arg::with_name("gain")
                .long("gain")
                .value_name("GAIN")
                .default_value("635")
                .validator(is_non_negative)
        )
        .arg(
            clap::Arg::with_name("brightness")
                .short("b")
                .long("brightness")
                .value_name("brightness")
                .help("Scales the gain. It should be between (0, 1]")
                .default_value("1.0")
                .validator(|s| {
                    match f32::from_str(&s) {
                        Ok(f) => if f <= 0.0 || f > 1.0 {
                            Err("Brightness must be be between (0, 1]".to_string())
                        } else {
                            Ok(())
                        }
                        Err(_) => Err("Brightness should be a float".to_string())
                    }
                })
        )
        .arg(
            clap::Arg::with_name("cap")
                .long("cap")
                .value_name("CAP")
                .help("Most the strip may draw per LED, as r + g + b")
                .default_value("127")
                .validator(|s| match u8::from_str(&s) {
                    Ok(n) if n > 0 => Ok(()),
                    _ => Err("cap must be between 1 and 255".to_string()),
                })
        )
        .arg(
            clap::Arg::with_name("colors")
                .long("colors")
                .value_name("FIELD")
                .possible_values(&["hue", "sphere"])
                .default_value("hue")
        )
        .arg(
            clap::Arg::with_name("encoding")
                .short("e")
                .long("encoding")
                .value_name("ENCODING")
                .help("Addressed tags every byte with LED and channel, plain is raw r,g,b")
                .possible_values(&["addressed", "plain"])
                .default_value("addressed")
        )
        .arg(
            clap::Arg::with_name("queue")
                .long("queue")
                .value_name("BLOCKS")
                .help("Capture on a separate thread with this many queued blocks, 0 reads inline")
                .possible_values(&["0", "1", "2"])
                .default_value("2")
        )
        .arg(
            clap::Arg::with_name("preview")
                .long("preview")
                .help("Draw every frame on stderr")
        );
    #[cfg(feature = "jack")]
    let app = app.arg(
        clap::Arg::with_name("jack")
            .long("jack")
            .help("Capture from a running JACK server instead of PCM input")
    );
    app
}
