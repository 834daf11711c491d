//! Static translation table for everything the service itself says.
//!
//! Only the strings the generation flow needs live here: the six horizon
//! prompts and labels, user-facing failure messages and the chart legend.

use crate::models::{GenerationRequest, Horizon, Language};

struct HorizonText {
    label: &'static str,
    prompt: &'static str,
}

pub struct ChartText {
    pub labels: [&'static str; 9],
    pub wood: &'static str,
    pub steel: &'static str,
    pub stone: &'static str,
    pub y_axis: &'static str,
}

const EN_HORIZONS: [HorizonText; 6] = [
    HorizonText {
        label: "+1 Year",
        prompt: "Re-render this exact scene one year after all humans have vanished. Keep the composition and camera angle. Show weeds in pavement cracks, dust on windows, dead lawns and the first signs of neglect. Photorealistic.",
    },
    HorizonText {
        label: "+100 Years",
        prompt: "Re-render this exact scene one hundred years after all humans have vanished. Keep the composition. Wooden structures have collapsed, steel is heavily rusted, roofs have caved in and young forest covers the ground. Photorealistic.",
    },
    HorizonText {
        label: "+1,000 Years",
        prompt: "Re-render this exact scene one thousand years after all humans have vanished. Keep the composition. Only fragments of concrete and stone remain under dense mature forest; steel has rusted away. Photorealistic.",
    },
    HorizonText {
        label: "+10,000 Years",
        prompt: "Re-render this exact scene ten thousand years after all humans have vanished. Keep the composition. Barely recognizable stone mounds are buried in soil and wilderness; the landscape looks almost untouched. Photorealistic.",
    },
    HorizonText {
        label: "+100,000 Years",
        prompt: "Re-render this exact scene one hundred thousand years after all humans have vanished. Keep the composition. No trace of construction is visible; rivers and vegetation have reshaped the terrain. Photorealistic.",
    },
    HorizonText {
        label: "+1,000,000 Years",
        prompt: "Re-render this exact scene one million years after all humans have vanished. Keep the composition and viewpoint. Geology and climate have changed the land, with unfamiliar flora and no sign humans ever existed. Photorealistic.",
    },
];

const ZH_HORIZONS: [HorizonText; 6] = [
    HorizonText {
        label: "1年后",
        prompt: "将这张照片中的场景重新渲染为人类消失一年后的样子。保持构图和拍摄角度。路面裂缝中长出杂草，窗户积满灰尘，草坪枯黄，显出最初的荒废迹象。写实风格。",
    },
    HorizonText {
        label: "100年后",
        prompt: "将这张照片中的场景重新渲染为人类消失一百年后的样子。保持构图。木结构已经倒塌，钢材严重锈蚀，屋顶塌陷，地面被幼林覆盖。写实风格。",
    },
    HorizonText {
        label: "1000年后",
        prompt: "将这张照片中的场景重新渲染为人类消失一千年后的样子。保持构图。茂密的森林下只剩下混凝土和石头的残片，钢铁已经锈蚀殆尽。写实风格。",
    },
    HorizonText {
        label: "1万年后",
        prompt: "将这张照片中的场景重新渲染为人类消失一万年后的样子。保持构图。几乎无法辨认的石堆被泥土和荒野掩埋，景观看起来近乎原始。写实风格。",
    },
    HorizonText {
        label: "10万年后",
        prompt: "将这张照片中的场景重新渲染为人类消失十万年后的样子。保持构图。看不到任何建筑痕迹，河流和植被已经重塑了地形。写实风格。",
    },
    HorizonText {
        label: "100万年后",
        prompt: "将这张照片中的场景重新渲染为人类消失一百万年后的样子。保持构图和视角。地质和气候已经改变了这片土地，出现陌生的植物，没有任何人类曾经存在的迹象。写实风格。",
    },
];

const JA_HORIZONS: [HorizonText; 6] = [
    HorizonText {
        label: "1年後",
        prompt: "この写真の風景を、人類が消えてから1年後の姿として描き直してください。構図とカメラアングルは維持します。舗装のひび割れに雑草が生え、窓はほこりをかぶり、芝生は枯れ、荒廃の兆しが現れています。写実的に。",
    },
    HorizonText {
        label: "100年後",
        prompt: "この写真の風景を、人類が消えてから100年後の姿として描き直してください。構図は維持します。木造の建物は崩れ、鉄骨はひどく錆び、屋根は落ち、地面は若い森に覆われています。写実的に。",
    },
    HorizonText {
        label: "1000年後",
        prompt: "この写真の風景を、人類が消えてから1000年後の姿として描き直してください。構図は維持します。深い森の下にコンクリートと石の断片だけが残り、鉄は錆びて消えています。写実的に。",
    },
    HorizonText {
        label: "1万年後",
        prompt: "この写真の風景を、人類が消えてから1万年後の姿として描き直してください。構図は維持します。かろうじて分かる石の塚が土と原野に埋もれ、景観はほぼ手つかずに見えます。写実的に。",
    },
    HorizonText {
        label: "10万年後",
        prompt: "この写真の風景を、人類が消えてから10万年後の姿として描き直してください。構図は維持します。建造物の痕跡はなく、川と植生が地形を作り変えています。写実的に。",
    },
    HorizonText {
        label: "100万年後",
        prompt: "この写真の風景を、人類が消えてから100万年後の姿として描き直してください。構図と視点は維持します。地質と気候が土地を変え、見慣れない植物が茂り、人類が存在した痕跡はどこにもありません。写実的に。",
    },
];

fn horizon_table(language: Language) -> &'static [HorizonText; 6] {
    match language {
        Language::En => &EN_HORIZONS,
        Language::Zh => &ZH_HORIZONS,
        Language::Ja => &JA_HORIZONS,
    }
}

/// The six requests of one run, always in `Horizon::ALL` order.
pub fn generation_requests(language: Language) -> Vec<GenerationRequest> {
    Horizon::ALL
        .iter()
        .zip(horizon_table(language).iter())
        .map(|(horizon, text)| GenerationRequest {
            horizon: *horizon,
            prompt: text.prompt.to_string(),
            label: text.label.to_string(),
        })
        .collect()
}

pub fn horizon_label(language: Language, horizon: Horizon) -> &'static str {
    horizon_table(language)[horizon.index()].label
}

/// Shown when any synthesis call fails.
pub fn generation_failed(language: Language) -> &'static str {
    match language {
        Language::En => "Image generation failed. Please try again with another photo or later.",
        Language::Zh => "图像生成失败。请稍后重试或换一张照片。",
        Language::Ja => "画像の生成に失敗しました。時間をおいて再試行するか、別の写真をお試しください。",
    }
}

/// Shown when every image succeeded but the narration did not.
pub fn script_failed(language: Language) -> &'static str {
    match language {
        Language::En => "All six images were generated, but the narration script could not be written. You can still view the images.",
        Language::Zh => "六张图像均已生成，但旁白脚本生成失败。您仍然可以查看这些图像。",
        Language::Ja => "6枚の画像はすべて生成されましたが、ナレーション原稿の作成に失敗しました。画像は引き続き閲覧できます。",
    }
}

/// Shown when zip assembly fails; the run can be exported again.
pub fn archive_failed(language: Language) -> &'static str {
    match language {
        Language::En => "Could not build the download archive. Please try again.",
        Language::Zh => "无法创建下载压缩包，请重试。",
        Language::Ja => "ダウンロード用アーカイブを作成できませんでした。もう一度お試しください。",
    }
}

pub fn chart_text(language: Language) -> ChartText {
    match language {
        Language::En => ChartText {
            labels: ["Start", "1 Year", "100 Years", "1k Years", "10k Years", "100k Years", "1M Years", "10M Years", "100M Years"],
            wood: "Wood",
            steel: "Steel",
            stone: "Stone",
            y_axis: "Structural integrity (%)",
        },
        Language::Zh => ChartText {
            labels: ["开始", "1年", "100年", "1千年", "1万年", "10万年", "100万年", "1000万年", "1亿年"],
            wood: "木材",
            steel: "钢铁",
            stone: "石头",
            y_axis: "结构完整度 (%)",
        },
        Language::Ja => ChartText {
            labels: ["開始", "1年", "100年", "1000年", "1万年", "10万年", "100万年", "1000万年", "1億年"],
            wood: "木材",
            steel: "鉄鋼",
            stone: "石",
            y_axis: "構造の健全度 (%)",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_language_has_six_ordered_requests() {
        for lang in [Language::En, Language::Zh, Language::Ja] {
            let reqs = generation_requests(lang);
            assert_eq!(reqs.len(), 6);
            let horizons: Vec<Horizon> = reqs.iter().map(|r| r.horizon).collect();
            assert_eq!(horizons, Horizon::ALL.to_vec());
            assert!(reqs.iter().all(|r| !r.prompt.is_empty() && !r.label.is_empty()));
        }
    }

    #[test]
    fn english_labels_match_horizons() {
        let labels: Vec<String> = generation_requests(Language::En).into_iter().map(|r| r.label).collect();
        assert_eq!(
            labels,
            vec!["+1 Year", "+100 Years", "+1,000 Years", "+10,000 Years", "+100,000 Years", "+1,000,000 Years"]
        );
        assert_eq!(horizon_label(Language::Ja, Horizon::MillionYears), "100万年後");
    }

    #[test]
    fn labels_follow_horizon_positions() {
        for lang in [Language::En, Language::Zh, Language::Ja] {
            for (request, horizon) in generation_requests(lang).iter().zip(Horizon::ALL) {
                assert_eq!(request.label, horizon_label(lang, horizon));
            }
        }
        assert_eq!(horizon_label(Language::Zh, Horizon::OneYear), "1年后");
        assert_eq!(horizon_label(Language::En, Horizon::TenThousandYears), "+10,000 Years");
    }

    #[test]
    fn failure_messages_differ() {
        for lang in [Language::En, Language::Zh, Language::Ja] {
            assert_ne!(generation_failed(lang), script_failed(lang));
        }
    }
}
