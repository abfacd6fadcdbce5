use super::super::{ErrorKind, Interpreter};
use super::arg;
use crate::interpreter::types::InternalData;
use crate::types::Value;
use std::time::{SystemTime, UNIX_EPOCH};

// §15.9.1 time algorithms. Local time equals UTC here: timezone-sensitive
// rendering is delegated to the host, which can inject its own bindings.

const MS_PER_DAY: f64 = 86_400_000.0;
const MS_PER_HOUR: f64 = 3_600_000.0;
const MS_PER_MINUTE: f64 = 60_000.0;
const MS_PER_SECOND: f64 = 1000.0;

fn day(t: f64) -> f64 {
    (t / MS_PER_DAY).floor()
}

fn time_within_day(t: f64) -> f64 {
    t.rem_euclid(MS_PER_DAY)
}

fn days_in_year(y: f64) -> f64 {
    if y % 4.0 != 0.0 {
        365.0
    } else if y % 100.0 != 0.0 {
        366.0
    } else if y % 400.0 != 0.0 {
        365.0
    } else {
        366.0
    }
}

fn day_from_year(y: f64) -> f64 {
    365.0 * (y - 1970.0) + ((y - 1969.0) / 4.0).floor() - ((y - 1901.0) / 100.0).floor()
        + ((y - 1601.0) / 400.0).floor()
}

fn time_from_year(y: f64) -> f64 {
    MS_PER_DAY * day_from_year(y)
}

fn year_from_time(t: f64) -> f64 {
    let mut y = 1970.0 + (t / (365.2425 * MS_PER_DAY)).floor();
    while time_from_year(y) > t {
        y -= 1.0;
    }
    while time_from_year(y + 1.0) <= t {
        y += 1.0;
    }
    y
}

fn in_leap_year(t: f64) -> f64 {
    if days_in_year(year_from_time(t)) == 366.0 {
        1.0
    } else {
        0.0
    }
}

fn day_within_year(t: f64) -> f64 {
    day(t) - day_from_year(year_from_time(t))
}

fn month_from_time(t: f64) -> f64 {
    let d = day_within_year(t);
    let leap = in_leap_year(t);
    let bounds = [
        0.0,
        31.0,
        59.0 + leap,
        90.0 + leap,
        120.0 + leap,
        151.0 + leap,
        181.0 + leap,
        212.0 + leap,
        243.0 + leap,
        273.0 + leap,
        304.0 + leap,
        334.0 + leap,
        365.0 + leap,
    ];
    for month in 0..12 {
        if d >= bounds[month] && d < bounds[month + 1] {
            return month as f64;
        }
    }
    11.0
}

fn date_from_time(t: f64) -> f64 {
    let d = day_within_year(t);
    let leap = in_leap_year(t);
    let month = month_from_time(t);
    let offset = match month as u32 {
        0 => 0.0,
        1 => 31.0,
        2 => 59.0 + leap,
        3 => 90.0 + leap,
        4 => 120.0 + leap,
        5 => 151.0 + leap,
        6 => 181.0 + leap,
        7 => 212.0 + leap,
        8 => 243.0 + leap,
        9 => 273.0 + leap,
        10 => 304.0 + leap,
        _ => 334.0 + leap,
    };
    d - offset + 1.0
}

fn week_day(t: f64) -> f64 {
    (day(t) + 4.0).rem_euclid(7.0)
}

fn hour_from_time(t: f64) -> f64 {
    (t / MS_PER_HOUR).floor().rem_euclid(24.0)
}

fn min_from_time(t: f64) -> f64 {
    (t / MS_PER_MINUTE).floor().rem_euclid(60.0)
}

fn sec_from_time(t: f64) -> f64 {
    (t / MS_PER_SECOND).floor().rem_euclid(60.0)
}

fn ms_from_time(t: f64) -> f64 {
    t.rem_euclid(MS_PER_SECOND)
}

fn make_time(hour: f64, minute: f64, sec: f64, ms: f64) -> f64 {
    if !hour.is_finite() || !minute.is_finite() || !sec.is_finite() || !ms.is_finite() {
        return f64::NAN;
    }
    hour.trunc() * MS_PER_HOUR + minute.trunc() * MS_PER_MINUTE + sec.trunc() * MS_PER_SECOND
        + ms.trunc()
}

fn make_day(year: f64, month: f64, date: f64) -> f64 {
    if !year.is_finite() || !month.is_finite() || !date.is_finite() {
        return f64::NAN;
    }
    let (year, month, date) = (year.trunc(), month.trunc(), date.trunc());
    let ym = year + (month / 12.0).floor();
    let mn = month.rem_euclid(12.0);
    let mut t = time_from_year(ym);
    let leap = if days_in_year(ym) == 366.0 { 1.0 } else { 0.0 };
    let offsets = [
        0.0,
        31.0,
        59.0 + leap,
        90.0 + leap,
        120.0 + leap,
        151.0 + leap,
        181.0 + leap,
        212.0 + leap,
        243.0 + leap,
        273.0 + leap,
        304.0 + leap,
        334.0 + leap,
    ];
    t += offsets[mn as usize] * MS_PER_DAY;
    day(t) + date - 1.0
}

fn make_date(day: f64, time: f64) -> f64 {
    if !day.is_finite() || !time.is_finite() {
        return f64::NAN;
    }
    day * MS_PER_DAY + time
}

fn time_clip(t: f64) -> f64 {
    if !t.is_finite() || t.abs() > 8.64e15 {
        f64::NAN
    } else {
        t.trunc()
    }
}

fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub(crate) fn date_to_string(t: f64) -> String {
    if t.is_nan() {
        return "Invalid Date".to_string();
    }
    format!(
        "{} {} {:02} {} {:02}:{:02}:{:02} GMT+0000 (Coordinated Universal Time)",
        WEEKDAYS[week_day(t) as usize],
        MONTHS[month_from_time(t) as usize],
        date_from_time(t) as u32,
        year_from_time(t) as i64,
        hour_from_time(t) as u32,
        min_from_time(t) as u32,
        sec_from_time(t) as u32,
    )
}

fn date_to_utc_string(t: f64) -> String {
    if t.is_nan() {
        return "Invalid Date".to_string();
    }
    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        WEEKDAYS[week_day(t) as usize],
        date_from_time(t) as u32,
        MONTHS[month_from_time(t) as usize],
        year_from_time(t) as i64,
        hour_from_time(t) as u32,
        min_from_time(t) as u32,
        sec_from_time(t) as u32,
    )
}

pub(crate) fn date_to_iso_string(t: f64) -> Option<String> {
    if t.is_nan() {
        return None;
    }
    Some(format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year_from_time(t) as i64,
        month_from_time(t) as u32 + 1,
        date_from_time(t) as u32,
        hour_from_time(t) as u32,
        min_from_time(t) as u32,
        sec_from_time(t) as u32,
        ms_from_time(t) as u32,
    ))
}

// §15.9.4.2: the ISO interchange format, with missing components defaulted.
fn parse_date(text: &str) -> f64 {
    let text = text.trim();
    let (date_part, time_part) = match text.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (text, None),
    };
    let mut date_fields = date_part.splitn(3, '-');
    let year: f64 = match date_fields.next().and_then(|s| s.parse().ok()) {
        Some(y) => y,
        None => return f64::NAN,
    };
    let month: f64 = date_fields
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .map(|m| m - 1.0)
        .unwrap_or(0.0);
    let date: f64 = date_fields
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1.0);

    let mut hour = 0.0;
    let mut minute = 0.0;
    let mut second = 0.0;
    let mut millis = 0.0;
    if let Some(time_part) = time_part {
        let time_part = time_part
            .strip_suffix('Z')
            .unwrap_or(time_part);
        let (clock, ms) = match time_part.split_once('.') {
            Some((c, ms)) => (c, ms),
            None => (time_part, ""),
        };
        let mut clock_fields = clock.splitn(3, ':');
        hour = match clock_fields.next().and_then(|s| s.parse().ok()) {
            Some(h) => h,
            None => return f64::NAN,
        };
        minute = clock_fields
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        second = clock_fields
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        if !ms.is_empty() {
            let digits: String = ms.chars().take(3).collect();
            millis = digits.parse().unwrap_or(0.0);
            if digits.len() < 3 {
                millis *= 10f64.powi(3 - digits.len() as i32);
            }
        }
    }
    time_clip(make_date(
        make_day(year, month, date),
        make_time(hour, minute, second, millis),
    ))
}

impl Interpreter {
    pub(crate) fn create_date(&mut self, ms: f64) -> Value {
        let handle = self.create_object_proto(Some(self.date_proto));
        {
            let obj = self.object(handle);
            let mut od = obj.borrow_mut();
            od.class = "Date";
            od.data = Some(InternalData::Date(time_clip(ms)));
        }
        Value::Object(handle)
    }
}

fn this_time(
    interp: &mut Interpreter,
    this: &Value,
) -> Result<f64, crate::interpreter::StepError> {
    if let Value::Object(handle) = this {
        let ms = match &interp.object(*handle).borrow().data {
            Some(InternalData::Date(ms)) => Some(*ms),
            _ => None,
        };
        if let Some(ms) = ms {
            return Ok(ms);
        }
    }
    Err(interp.throw_error(
        ErrorKind::Type,
        "Date.prototype method called on incompatible receiver",
    ))
}

fn set_this_time(interp: &mut Interpreter, this: &Value, ms: f64) {
    if let Value::Object(handle) = this {
        let obj = interp.object(*handle);
        obj.borrow_mut().data = Some(InternalData::Date(time_clip(ms)));
    }
}

pub(crate) fn init(interp: &mut Interpreter) {
    let date_proto = interp.create_object_proto(Some(interp.object_proto));
    {
        let obj = interp.object(date_proto);
        let mut od = obj.borrow_mut();
        od.class = "Date";
        od.data = Some(InternalData::Date(f64::NAN));
    }
    interp.date_proto = date_proto;

    let ctor = interp.create_native_function(7, true, |interp, this, args| {
        if !interp.called_with_new() {
            return Ok(Value::string(&date_to_string(now_ms())));
        }
        let ms = match args.len() {
            0 => now_ms(),
            1 => match &args[0] {
                Value::String(s) => parse_date(&s.to_rust_string()),
                other => {
                    let prim = interp.to_number_value(other);
                    time_clip(prim)
                }
            },
            _ => {
                let number = |interp: &mut Interpreter, index: usize, default: f64| {
                    if index < args.len() {
                        interp.to_number_value(&args[index])
                    } else {
                        default
                    }
                };
                let mut year = number(interp, 0, f64::NAN);
                let month = number(interp, 1, 0.0);
                let date = number(interp, 2, 1.0);
                let hours = number(interp, 3, 0.0);
                let minutes = number(interp, 4, 0.0);
                let seconds = number(interp, 5, 0.0);
                let ms = number(interp, 6, 0.0);
                if (0.0..=99.0).contains(&year) {
                    year += 1900.0;
                }
                time_clip(make_date(
                    make_day(year, month, date),
                    make_time(hours, minutes, seconds, ms),
                ))
            }
        };
        if let Value::Object(handle) = this {
            let obj = interp.object(*handle);
            let mut od = obj.borrow_mut();
            od.class = "Date";
            od.data = Some(InternalData::Date(time_clip(ms)));
            return Ok(Value::Object(*handle));
        }
        Ok(interp.create_date(ms))
    });
    interp.link_constructor(&ctor, date_proto);
    interp.register_global("Date", ctor.clone());

    if let Value::Object(ctor_handle) = ctor {
        interp.set_method(ctor_handle, "now", 0, |_interp, _this, _args| {
            Ok(Value::Number(now_ms()))
        });
        interp.set_method(ctor_handle, "parse", 1, |interp, _this, args| {
            let text = interp.to_string_value(&arg(args, 0));
            Ok(Value::Number(parse_date(&text)))
        });
        interp.set_method(ctor_handle, "UTC", 7, |interp, _this, args| {
            let number = |interp: &mut Interpreter, index: usize, default: f64| {
                if index < args.len() {
                    interp.to_number_value(&args[index])
                } else {
                    default
                }
            };
            let mut year = number(interp, 0, f64::NAN);
            let month = number(interp, 1, 0.0);
            let date = number(interp, 2, 1.0);
            let hours = number(interp, 3, 0.0);
            let minutes = number(interp, 4, 0.0);
            let seconds = number(interp, 5, 0.0);
            let ms = number(interp, 6, 0.0);
            if (0.0..=99.0).contains(&year) {
                year += 1900.0;
            }
            Ok(Value::Number(time_clip(make_date(
                make_day(year, month, date),
                make_time(hours, minutes, seconds, ms),
            ))))
        });
    }

    // Getters; UTC variants coincide with the local ones here.
    let getters: &[(&str, fn(f64) -> f64)] = &[
        ("getTime", |t| t),
        ("valueOf", |t| t),
        ("getFullYear", year_from_time),
        ("getUTCFullYear", year_from_time),
        ("getMonth", month_from_time),
        ("getUTCMonth", month_from_time),
        ("getDate", date_from_time),
        ("getUTCDate", date_from_time),
        ("getDay", week_day),
        ("getUTCDay", week_day),
        ("getHours", hour_from_time),
        ("getUTCHours", hour_from_time),
        ("getMinutes", min_from_time),
        ("getUTCMinutes", min_from_time),
        ("getSeconds", sec_from_time),
        ("getUTCSeconds", sec_from_time),
        ("getMilliseconds", ms_from_time),
        ("getUTCMilliseconds", ms_from_time),
        ("getTimezoneOffset", |_| 0.0),
    ];
    for (name, f) in getters {
        let f = *f;
        let name: &'static str = *name;
        interp.set_method(date_proto, name, 0, move |interp, this, _args| {
            let t = this_time(interp, this)?;
            if t.is_nan() && name != "getTime" && name != "valueOf" {
                return Ok(Value::Number(f64::NAN));
            }
            Ok(Value::Number(f(t)))
        });
    }

    interp.set_method(date_proto, "setTime", 1, |interp, this, args| {
        this_time(interp, this)?;
        let ms = interp.to_number_value(&arg(args, 0));
        set_this_time(interp, this, ms);
        Ok(Value::Number(time_clip(ms)))
    });

    // Component setters rebuild the timestamp from the current fields.
    type Fields = (f64, f64, f64, f64, f64, f64, f64);
    fn fields_of(t: f64) -> Fields {
        (
            year_from_time(t),
            month_from_time(t),
            date_from_time(t),
            hour_from_time(t),
            min_from_time(t),
            sec_from_time(t),
            ms_from_time(t),
        )
    }
    fn rebuild(fields: Fields) -> f64 {
        let (year, month, date, hours, minutes, seconds, ms) = fields;
        time_clip(make_date(
            make_day(year, month, date),
            make_time(hours, minutes, seconds, ms),
        ))
    }

    macro_rules! component_setter {
        ($name:literal, $arity:literal, $apply:expr) => {
            interp.set_method(date_proto, $name, $arity, move |interp, this, args| {
                let t = this_time(interp, this)?;
                let base = if t.is_nan() { 0.0 } else { t };
                let mut fields = fields_of(base);
                let apply: fn(&mut Interpreter, &mut Fields, &[Value]) = $apply;
                apply(interp, &mut fields, args);
                let new_t = rebuild(fields);
                set_this_time(interp, this, new_t);
                Ok(Value::Number(new_t))
            });
        };
    }

    component_setter!("setFullYear", 3, |interp, fields, args| {
        fields.0 = interp.to_number_value(&arg(args, 0));
        if args.len() > 1 {
            fields.1 = interp.to_number_value(&arg(args, 1));
        }
        if args.len() > 2 {
            fields.2 = interp.to_number_value(&arg(args, 2));
        }
    });
    component_setter!("setMonth", 2, |interp, fields, args| {
        fields.1 = interp.to_number_value(&arg(args, 0));
        if args.len() > 1 {
            fields.2 = interp.to_number_value(&arg(args, 1));
        }
    });
    component_setter!("setDate", 1, |interp, fields, args| {
        fields.2 = interp.to_number_value(&arg(args, 0));
    });
    component_setter!("setHours", 4, |interp, fields, args| {
        fields.3 = interp.to_number_value(&arg(args, 0));
        if args.len() > 1 {
            fields.4 = interp.to_number_value(&arg(args, 1));
        }
        if args.len() > 2 {
            fields.5 = interp.to_number_value(&arg(args, 2));
        }
        if args.len() > 3 {
            fields.6 = interp.to_number_value(&arg(args, 3));
        }
    });
    component_setter!("setMinutes", 3, |interp, fields, args| {
        fields.4 = interp.to_number_value(&arg(args, 0));
        if args.len() > 1 {
            fields.5 = interp.to_number_value(&arg(args, 1));
        }
        if args.len() > 2 {
            fields.6 = interp.to_number_value(&arg(args, 2));
        }
    });
    component_setter!("setSeconds", 2, |interp, fields, args| {
        fields.5 = interp.to_number_value(&arg(args, 0));
        if args.len() > 1 {
            fields.6 = interp.to_number_value(&arg(args, 1));
        }
    });
    component_setter!("setMilliseconds", 1, |interp, fields, args| {
        fields.6 = interp.to_number_value(&arg(args, 0));
    });

    interp.set_method(date_proto, "toString", 0, |interp, this, _args| {
        let t = this_time(interp, this)?;
        Ok(Value::string(&date_to_string(t)))
    });
    interp.set_method(date_proto, "toDateString", 0, |interp, this, _args| {
        let t = this_time(interp, this)?;
        if t.is_nan() {
            return Ok(Value::string("Invalid Date"));
        }
        Ok(Value::string(&format!(
            "{} {} {:02} {}",
            WEEKDAYS[week_day(t) as usize],
            MONTHS[month_from_time(t) as usize],
            date_from_time(t) as u32,
            year_from_time(t) as i64,
        )))
    });
    interp.set_method(date_proto, "toUTCString", 0, |interp, this, _args| {
        let t = this_time(interp, this)?;
        Ok(Value::string(&date_to_utc_string(t)))
    });
    interp.set_method(date_proto, "toLocaleString", 0, |interp, this, _args| {
        let t = this_time(interp, this)?;
        Ok(Value::string(&date_to_string(t)))
    });
    interp.set_method(date_proto, "toISOString", 0, |interp, this, _args| {
        let t = this_time(interp, this)?;
        match date_to_iso_string(t) {
            Some(iso) => Ok(Value::string(&iso)),
            None => Err(interp.throw_error(ErrorKind::Range, "Invalid time value")),
        }
    });
    interp.set_method(date_proto, "toJSON", 1, |interp, this, _args| {
        let t = this_time(interp, this)?;
        match date_to_iso_string(t) {
            Some(iso) => Ok(Value::string(&iso)),
            None => Ok(Value::Null),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_fields() {
        let t = 0.0;
        assert_eq!(year_from_time(t), 1970.0);
        assert_eq!(month_from_time(t), 0.0);
        assert_eq!(date_from_time(t), 1.0);
        assert_eq!(week_day(t), 4.0); // Thursday
    }

    #[test]
    fn make_day_round_trips() {
        let d = make_day(2020.0, 1.0, 29.0); // 29 Feb 2020, a leap day
        let t = make_date(d, 0.0);
        assert_eq!(year_from_time(t), 2020.0);
        assert_eq!(month_from_time(t), 1.0);
        assert_eq!(date_from_time(t), 29.0);
    }

    #[test]
    fn month_overflow_carries() {
        let d = make_day(2021.0, 12.0, 1.0); // month 12 is January 2022
        let t = make_date(d, 0.0);
        assert_eq!(year_from_time(t), 2022.0);
        assert_eq!(month_from_time(t), 0.0);
    }

    #[test]
    fn iso_parse_and_format() {
        let t = parse_date("2021-03-04T05:06:07.089Z");
        assert_eq!(date_to_iso_string(t).unwrap(), "2021-03-04T05:06:07.089Z");
        let date_only = parse_date("2021-03-04");
        assert_eq!(year_from_time(date_only), 2021.0);
        assert_eq!(hour_from_time(date_only), 0.0);
        assert!(parse_date("not a date").is_nan());
    }

    #[test]
    fn clip_rejects_out_of_range() {
        assert!(time_clip(8.7e15).is_nan());
        assert_eq!(time_clip(123.9), 123.0);
    }
}
