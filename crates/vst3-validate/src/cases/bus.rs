use vst3_host::ffi::{ARRANGEMENT_51, ARRANGEMENT_MONO};
use vst3_host::{BusDirection, BusType, Component, ComponentInstance, MediaType, ResultCode};

use super::{audio_modules, must_succeed, summarize};
use crate::context::{CaseContext, CaseResult};
use crate::error::Failure;
use crate::registry::{all_classes, Stage, Suite, TestCase};

const MEDIA: [MediaType; 2] = [MediaType::Audio, MediaType::Event];
const DIRECTIONS: [BusDirection; 2] = [BusDirection::Input, BusDirection::Output];

pub fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new("bus.enumerate", Suite::Bus, Stage::Initialized, all_classes, enumerate),
        TestCase::new(
            "bus.arrangements",
            Suite::Bus,
            Stage::Initialized,
            audio_modules,
            arrangements,
        ),
        TestCase::new("bus.activation", Suite::Bus, Stage::Initialized, all_classes, activation),
    ]
}

fn enumerate(ctx: &mut CaseContext) -> CaseResult {
    let mut advice = Vec::new();
    {
        let component = ctx.instance()?.query();
        for media in MEDIA {
            for direction in DIRECTIONS {
                enumerate_buses(component, media, direction, &mut advice)?;
            }
        }
    }
    if !advice.is_empty() {
        ctx.warn(summarize(&advice));
    }
    Ok(())
}

/// Checks every bus of one media type and direction.
fn enumerate_buses(
    component: &dyn Component,
    media: MediaType,
    direction: BusDirection,
    advice: &mut Vec<String>,
) -> CaseResult {
    let count = component.bus_count(media, direction);
    if count < 0 {
        return Err(Failure::contract(format!(
            "{media:?} {direction:?} bus count is {count}"
        )));
    }
    let mut seen_aux = false;
    for index in 0..count {
        let info = component.bus_info(media, direction, index).map_err(|code| {
            Failure::contract(format!(
                "getBusInfo({media:?}, {direction:?}, {index}) returned {code}"
            ))
        })?;
        if info.media != media.raw() || info.direction != direction.raw() {
            return Err(Failure::contract(format!(
                "{media:?} {direction:?} bus {index} reports media {} direction {}",
                info.media, info.direction
            )));
        }
        if info.channel_count < 0 {
            return Err(Failure::contract(format!(
                "{media:?} {direction:?} bus {index} has {} channels",
                info.channel_count
            )));
        }
        if media == MediaType::Audio && info.channel_count == 0 {
            advice.push(format!("audio {direction:?} bus {index} has no channels"));
        }
        if info.name.trim().is_empty() {
            advice.push(format!("{media:?} {direction:?} bus {index} has no name"));
        }
        match info.bus_type {
            BusType::Aux => seen_aux = true,
            BusType::Main if seen_aux => advice.push(format!(
                "{media:?} {direction:?} main bus {index} follows an aux bus"
            )),
            BusType::Main => {}
            BusType::Unknown(raw) => {
                return Err(Failure::contract(format!(
                    "{media:?} {direction:?} bus {index} has unknown bus type {raw}"
                )))
            }
        }
    }
    for index in [count, -1] {
        if component.bus_info(media, direction, index).is_ok() {
            return Err(Failure::contract(format!(
                "getBusInfo({media:?}, {direction:?}, {index}) succeeded for an invalid index"
            )));
        }
    }
    Ok(())
}

fn arrangements_of(
    instance: &ComponentInstance,
    direction: BusDirection,
) -> Result<Vec<u64>, Failure> {
    let component = instance.query();
    (0..component.bus_count(MediaType::Audio, direction))
        .map(|index| {
            component.bus_arrangement(direction, index).map_err(|code| {
                Failure::contract(format!(
                    "getBusArrangement({direction:?}, {index}) returned {code}"
                ))
            })
        })
        .collect()
}

fn channel_counts(
    instance: &ComponentInstance,
    direction: BusDirection,
) -> Result<Vec<i32>, Failure> {
    let component = instance.query();
    (0..component.bus_count(MediaType::Audio, direction))
        .map(|index| {
            component
                .bus_info(MediaType::Audio, direction, index)
                .map(|info| info.channel_count)
                .map_err(|code| {
                    Failure::contract(format!(
                        "getBusInfo(Audio, {direction:?}, {index}) returned {code}"
                    ))
                })
        })
        .collect()
}

/// Checks the plug-in's answer to a requested arrangement.
fn verify_answer(
    instance: &ComponentInstance,
    code: ResultCode,
    requested: (&[u64], &[u64]),
    before: (&[u64], &[u64]),
) -> CaseResult {
    let reported = (
        arrangements_of(instance, BusDirection::Input)?,
        arrangements_of(instance, BusDirection::Output)?,
    );
    if code.is_ok() {
        if reported.0 != requested.0 || reported.1 != requested.1 {
            return Err(Failure::contract(format!(
                "accepted arrangement {requested:x?} but reports {reported:x?}"
            )));
        }
    } else if code == ResultCode::FALSE {
        for direction in [BusDirection::Input, BusDirection::Output] {
            let arrangement = match direction {
                BusDirection::Input => &reported.0,
                BusDirection::Output => &reported.1,
            };
            let channels = channel_counts(instance, direction)?;
            for (index, (speakers, count)) in arrangement.iter().zip(&channels).enumerate() {
                if speakers.count_ones() as i32 != *count {
                    return Err(Failure::contract(format!(
                        "adjusted {direction:?} bus {index} arrangement {speakers:#x} \
                         does not match its {count} channels"
                    )));
                }
            }
        }
    } else if reported.0 != before.0 || reported.1 != before.1 {
        return Err(Failure::contract(format!(
            "refused arrangement ({code}) but changed it from {before:x?} to {reported:x?}"
        )));
    }
    Ok(())
}

fn arrangements(ctx: &mut CaseContext) -> CaseResult {
    let instance = ctx.instance()?;
    let inputs = arrangements_of(instance, BusDirection::Input)?;
    let outputs = arrangements_of(instance, BusDirection::Output)?;
    if inputs.is_empty() && outputs.is_empty() {
        return ctx.skip("class has no audio buses");
    }

    let code = instance.set_bus_arrangements(&inputs, &outputs)?;
    verify_answer(instance, code, (&inputs, &outputs), (&inputs, &outputs))?;

    let before = (
        arrangements_of(instance, BusDirection::Input)?,
        arrangements_of(instance, BusDirection::Output)?,
    );
    for unusual in [ARRANGEMENT_51, ARRANGEMENT_MONO] {
        let request_in = vec![unusual; before.0.len()];
        let request_out = vec![unusual; before.1.len()];
        let code = instance.raw().set_bus_arrangements(&request_in, &request_out);
        verify_answer(instance, code, (&request_in, &request_out), (&before.0, &before.1))?;
        // Put the original arrangement back for the next request.
        instance.raw().set_bus_arrangements(&before.0, &before.1);
    }
    Ok(())
}

fn activation(ctx: &mut CaseContext) -> CaseResult {
    let mut advice = Vec::new();
    {
        let instance = ctx.instance()?;
        for media in MEDIA {
            for direction in DIRECTIONS {
                let count = instance.query().bus_count(media, direction);
                for index in 0..count {
                    let default_active = instance
                        .query()
                        .bus_info(media, direction, index)
                        .map(|info| info.is_default_active())
                        .unwrap_or(false);
                    let call = format!("activateBus({media:?}, {direction:?}, {index}");
                    let mut toggle = |active: bool| {
                        must_succeed(
                            instance.activate_bus(media, direction, index, active),
                            &format!("{call}, {active})"),
                        )
                    };
                    toggle(true)?;
                    toggle(false)?;
                    if default_active {
                        toggle(true)?;
                    }
                }
                if instance.activate_bus(media, direction, count, true).is_ok() {
                    advice.push(format!(
                        "activateBus({media:?}, {direction:?}, {count}) accepted an invalid index"
                    ));
                }
            }
        }
    }
    if !advice.is_empty() {
        ctx.warn(summarize(&advice));
    }
    Ok(())
}
